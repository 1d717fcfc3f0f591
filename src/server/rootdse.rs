//! Synthesis of the root DSE and subschema subentry (RFC 4512 §5.1/§4.2), returned to a
//! base-scope Search of the zero-length DN or `cn=Subschema` respectively. Neither entry
//! lives in the entry store; both are built fresh from the directory's configuration on
//! every request.

use crate::search::SearchEntry;
use crate::server::changelog::{changelog_dn, ChangeLog};
use crate::server::exop::SUPPORTED_EXTENSION_OIDS;

/// The OIDs of every control this server recognizes server-side (RFC 4511 §4.1.11),
/// advertised in the root DSE's `supportedControl` attribute.
pub const SUPPORTED_CONTROL_OIDS: &[&str] = &[
    crate::controls_impl::manage_dsa_it::MANAGE_DSA_IT_OID,
    crate::controls_impl::assertion::ASSERTION_OID,
    crate::controls_impl::read_entry::PRE_READ_OID,
    crate::controls_impl::read_entry::POST_READ_OID,
    crate::controls_impl::proxy_auth::PROXY_AUTH_V1_OID,
    crate::controls_impl::proxy_auth::PROXY_AUTH_V2_OID,
    crate::controls_impl::SUBTREE_DELETE_OID,
    crate::controls_impl::SUBENTRIES_OID,
    crate::controls_impl::PERMISSIVE_MODIFY_OID,
    crate::controls_impl::IGNORE_NO_USER_MODIFICATION_OID,
];

/// Build the root DSE entry (RFC 4512 §5.1): a base-scope-only, DN-less synthetic entry
/// describing server capabilities.
pub fn root_dse(base_dns: &[crate::dn::Dn], changelog: &ChangeLog, vendor_name: &str, vendor_version: &str) -> SearchEntry {
    let mut attrs = vec![
        ("objectClass".to_owned(), vec![b"top".to_vec(), b"extensibleObject".to_vec()]),
        ("supportedLDAPVersion".to_owned(), vec![b"3".to_vec()]),
        ("vendorName".to_owned(), vec![vendor_name.as_bytes().to_vec()]),
        ("vendorVersion".to_owned(), vec![vendor_version.as_bytes().to_vec()]),
        ("namingContexts".to_owned(), base_dns.iter().map(|d| d.to_string().into_bytes()).collect()),
        ("subschemaSubentry".to_owned(), vec![schema_dn().to_string().into_bytes()]),
        ("supportedControl".to_owned(), SUPPORTED_CONTROL_OIDS.iter().map(|o| o.as_bytes().to_vec()).collect()),
        ("supportedExtension".to_owned(), SUPPORTED_EXTENSION_OIDS.iter().map(|o| o.as_bytes().to_vec()).collect()),
        ("supportedSASLMechanisms".to_owned(), vec![b"EXTERNAL".to_vec()]),
        (
            "supportedFeatures".to_owned(),
            vec![
                b"1.3.6.1.4.1.4203.1.5.1".to_vec(),
                b"1.3.6.1.4.1.4203.1.5.2".to_vec(),
                b"1.3.6.1.4.1.4203.1.5.3".to_vec(),
                b"1.3.6.1.1.14".to_vec(),
            ],
        ),
    ];
    if changelog.enabled() {
        attrs.push(("changeLog".to_owned(), vec![changelog_dn().to_string().into_bytes()]));
        attrs.push(("firstChangeNumber".to_owned(), vec![changelog.first_change_number().to_string().into_bytes()]));
        attrs.push(("lastChangeNumber".to_owned(), vec![changelog.last_change_number().to_string().into_bytes()]));
    }
    SearchEntry { dn: String::new(), attrs }
}

/// The DN of the server's one synthetic subschema subentry.
pub fn schema_dn() -> crate::dn::Dn {
    crate::dn::Dn::parse("cn=Subschema").expect("static DN")
}

/// Build the subschema subentry (RFC 4512 §4.2), summarizing the schema's object
/// classes and attribute types as RFC 4512 description strings.
pub fn subschema_entry(schema: &crate::schema::Schema) -> SearchEntry {
    SearchEntry {
        dn: schema_dn().to_string(),
        attrs: vec![
            ("objectClass".to_owned(), vec![b"top".to_vec(), b"subschema".to_vec(), b"subentry".to_vec()]),
            ("cn".to_owned(), vec![b"Subschema".to_vec()]),
            ("objectClasses".to_owned(), schema.object_class_descriptions().into_iter().map(String::into_bytes).collect()),
            ("attributeTypes".to_owned(), schema.attribute_type_descriptions().into_iter().map(String::into_bytes).collect()),
        ],
    }
}
