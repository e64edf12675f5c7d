//! Flag deltas from the `ApplicationData` of a Sync `Change`.

use crate::error::Result;
use crate::model::message::{FLAG_FLAGGED, FLAG_SEEN};
use crate::model::FlagChanges;

use super::codepages::email as em;
use super::wbxml::Element;

pub fn parse_changed_message(node: &Element) -> Result<FlagChanges> {
    let mut changes = FlagChanges::default();
    for child in node.elements() {
        match child.tag {
            em::READ => changes.set(FLAG_SEEN, child.required_text()? == "1"),
            em::FLAG => {
                for status in child.elements().filter(|e| e.tag == em::FLAG_STATUS) {
                    changes.set(FLAG_FLAGGED, status.required_text()? != "0");
                }
            }
            _ => {}
        }
    }
    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_and_flag() {
        let node = Element::new(0)
            .child(Element::with_text(em::READ, "0"))
            .child(Element::new(em::FLAG).child(Element::with_text(em::FLAG_STATUS, "2")));
        let changes = parse_changed_message(&node).unwrap();
        assert_eq!(changes.add, Some(vec![FLAG_FLAGGED.to_string()]));
        assert_eq!(changes.remove, Some(vec![FLAG_SEEN.to_string()]));
    }

    #[test]
    fn test_unrelated_fields_yield_no_changes() {
        let node = Element::new(0).child(Element::with_text(em::SUBJECT, "x"));
        assert!(parse_changed_message(&node).unwrap().is_empty());
    }

    #[test]
    fn test_empty_flag_is_ignored() {
        let node = Element::new(0).child(Element::new(em::FLAG));
        assert!(parse_changed_message(&node).unwrap().is_empty());
    }
}
