//! Unbind request encoding (RFC 4511 §4.3). There is no response; the server closes
//! the connection.

use lber::common::TagClass;
use lber::structures::{ASNTag, Null};

use lber::structure::StructureTag;

/// Build the APPLICATION(2) primitive `UnbindRequest` tag (an empty NULL).
pub fn unbind_request() -> StructureTag {
    Null { id: 2, class: TagClass::Application, inner: () }.into_structure()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unbind_request_is_empty_application_2() {
        let tag = unbind_request();
        assert_eq!(tag.class, TagClass::Application);
        assert_eq!(tag.id, 2);
        assert_eq!(tag.expect_primitive().unwrap(), Vec::<u8>::new());
    }
}
