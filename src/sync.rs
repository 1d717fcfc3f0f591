//! A synchronous façade (`LdapConn`) over the async connection engine (C7), for scripts
//! and tests that would rather not set up their own runtime. Grounded in the teacher's
//! `sync.rs`, updated from its `tokio::runtime::Builder::basic_scheduler()` (tokio 0.2)
//! to the current-thread runtime builder of tokio 1.x.

use std::time::Duration;

use tokio::runtime::{Builder, Runtime};

use crate::conn::{Ldap, LdapConnAsync, LdapConnSettings};
use crate::entry::Modification;
use crate::exop::Request;
use crate::result::{CompareResult, ExopResult, LdapResult, Result, SearchResult};
use crate::search::SearchRequest;

/// A blocking LDAP client handle: an [`Ldap`] paired with a dedicated current-thread
/// `tokio` runtime that drives the connection and executes every call to completion
/// before returning.
pub struct LdapConn {
    ldap: Ldap,
    rt: Runtime,
}

impl LdapConn {
    pub fn new(url: &str) -> Result<Self> {
        Self::with_settings(url, LdapConnSettings::default())
    }

    pub fn with_settings(url: &str, settings: LdapConnSettings) -> Result<Self> {
        let rt = Builder::new_current_thread().enable_all().build().map_err(crate::result::LdapError::Io)?;
        let ldap = rt.block_on(async move {
            let (conn, ldap) = LdapConnAsync::with_settings(url, settings).await?;
            tokio::spawn(conn.drive());
            Ok::<_, crate::result::LdapError>(ldap)
        })?;
        Ok(LdapConn { ldap, rt })
    }

    pub fn simple_bind(&mut self, bind_dn: &str, bind_pw: &str) -> Result<LdapResult> {
        let ldap = self.ldap.clone();
        self.rt.block_on(async move { ldap.simple_bind(bind_dn, bind_pw).await })
    }

    pub fn sasl_external_bind(&mut self) -> Result<LdapResult> {
        let ldap = self.ldap.clone();
        self.rt.block_on(async move { ldap.sasl_external_bind().await })
    }

    pub fn add(&mut self, dn: &str, attrs: &[(String, Vec<Vec<u8>>)]) -> Result<LdapResult> {
        let ldap = self.ldap.clone();
        let dn = dn.to_owned();
        let attrs = attrs.to_vec();
        self.rt.block_on(async move { ldap.add(&dn, &attrs).await })
    }

    pub fn delete(&mut self, dn: &str) -> Result<LdapResult> {
        let ldap = self.ldap.clone();
        let dn = dn.to_owned();
        self.rt.block_on(async move { ldap.delete(&dn).await })
    }

    pub fn modify(&mut self, dn: &str, mods: &[Modification]) -> Result<LdapResult> {
        let ldap = self.ldap.clone();
        let dn = dn.to_owned();
        let mods = mods.to_vec();
        self.rt.block_on(async move { ldap.modify(&dn, &mods).await })
    }

    pub fn modifydn(&mut self, dn: &str, new_rdn: &str, delete_old_rdn: bool, new_superior: Option<&str>) -> Result<LdapResult> {
        let ldap = self.ldap.clone();
        let dn = dn.to_owned();
        let new_rdn = new_rdn.to_owned();
        let new_superior = new_superior.map(|s| s.to_owned());
        self.rt.block_on(async move { ldap.modifydn(&dn, &new_rdn, delete_old_rdn, new_superior.as_deref()).await })
    }

    pub fn compare(&mut self, dn: &str, attr: &str, value: &[u8]) -> Result<CompareResult> {
        let ldap = self.ldap.clone();
        let dn = dn.to_owned();
        let attr = attr.to_owned();
        let value = value.to_vec();
        self.rt.block_on(async move { ldap.compare(&dn, &attr, &value).await })
    }

    pub fn search(&mut self, req: SearchRequest) -> Result<SearchResult> {
        let ldap = self.ldap.clone();
        self.rt.block_on(async move { ldap.search(req).await })
    }

    pub fn extended<E: Request + 'static>(&mut self, exop: E) -> Result<ExopResult> {
        let ldap = self.ldap.clone();
        self.rt.block_on(async move { ldap.extended(exop).await })
    }

    pub fn unbind(self) -> Result<()> {
        self.ldap.unbind()?;
        self.rt.block_on(tokio::time::sleep(Duration::from_millis(1)));
        Ok(())
    }
}
