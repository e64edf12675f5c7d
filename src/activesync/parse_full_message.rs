//! Build a [`MessageInfo`] from the `ApplicationData` of a Sync `Add`.

use chrono::DateTime;
use tracing::warn;

use crate::error::{Result, SyncError};
use crate::model::ids::encode_a64;
use crate::model::message::{BodyStub, FLAG_FLAGGED, FLAG_SEEN};
use crate::model::{AddressPair, AttachmentPart, BodyType, IssuedIds, MessageInfo};

use super::codepages::{air_sync_base as asb, email as em};
use super::wbxml::Element;

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

pub fn parse_full_message(node: &Element, ids: IssuedIds) -> Result<MessageInfo> {
    let IssuedIds {
        message_id,
        umid,
        folder_id,
    } = ids;

    let mut info = MessageInfo {
        id: message_id,
        umid,
        folder_ids: [folder_id].into(),
        ..Default::default()
    };
    let mut body = BodyStub {
        body_type: BodyType::Plain,
        ..Default::default()
    };

    for child in node.elements() {
        match child.tag {
            em::SUBJECT => info.subject = child.text().map(str::to_string),
            em::FROM => {
                info.author = child
                    .text()
                    .and_then(|raw| AddressPair::parse_list(raw).into_iter().next());
            }
            em::TO => info.to = child.text().map(AddressPair::parse_list),
            em::CC => info.cc = child.text().map(AddressPair::parse_list),
            em::REPLY_TO => info.reply_to = child.text().map(AddressPair::parse_list),
            em::DATE_RECEIVED => {
                let raw = child.required_text()?;
                let date = DateTime::parse_from_rfc3339(raw)
                    .map_err(|_| SyncError::InvalidDate(raw.to_string()))?;
                info.date = Some(date.timestamp_millis());
            }
            em::READ => {
                if child.text() == Some("1") {
                    info.flags.push(FLAG_SEEN.to_string());
                }
            }
            em::FLAG => {
                for status in child.elements().filter(|e| e.tag == em::FLAG_STATUS) {
                    if status.required_text()? != "0" {
                        info.flags.push(FLAG_FLAGGED.to_string());
                    }
                }
            }
            asb::BODY => {
                for part in child.elements() {
                    match part.tag {
                        asb::TYPE => {
                            let kind = part.required_text()?;
                            body.body_type = if kind == asb::body_type::HTML {
                                BodyType::Html
                            } else {
                                if kind != asb::body_type::PLAIN_TEXT {
                                    warn!(
                                        body_type = kind,
                                        "Unsupported body type, treating as plain"
                                    );
                                }
                                BodyType::Plain
                            };
                        }
                        asb::ESTIMATED_DATA_SIZE => body.size_estimate = parse_size(part)?,
                        _ => {}
                    }
                }
            }
            // Pre-12.0 servers report the body size directly.
            em::BODY_SIZE => {
                body.body_type = BodyType::Plain;
                body.size_estimate = parse_size(child)?;
            }
            asb::ATTACHMENTS | em::ATTACHMENTS => {
                for att_node in child
                    .elements()
                    .filter(|e| e.tag == asb::ATTACHMENT || e.tag == em::ATTACHMENT)
                {
                    let (attachment, inline) = parse_attachment(att_node, info.attachments.len())?;
                    if inline {
                        info.related_parts.push(attachment);
                    } else {
                        info.attachments.push(attachment);
                    }
                }
            }
            _ => {}
        }
    }

    info.has_attachments = !info.attachments.is_empty();
    info.body_reps = vec![body];
    Ok(info)
}

fn parse_attachment(node: &Element, position: usize) -> Result<(AttachmentPart, bool)> {
    let mut attachment = AttachmentPart {
        rel_id: encode_a64(position as u64),
        ..Default::default()
    };
    let mut inline = false;

    for field in node.elements() {
        match field.tag {
            asb::DISPLAY_NAME | em::DISPLAY_NAME => {
                let name = field.required_text()?;
                attachment.mime_type = Some(mime_type_for(name));
                attachment.name = Some(name.to_string());
            }
            asb::FILE_REFERENCE | em::ATT_NAME | em::ATT0_ID => {
                attachment.part = field.text().map(str::to_string);
            }
            asb::ESTIMATED_DATA_SIZE | em::ATT_SIZE => {
                attachment.size_estimate = Some(parse_size(field)?);
            }
            asb::CONTENT_ID => attachment.content_id = field.text().map(str::to_string),
            asb::IS_INLINE => inline = field.text() == Some("1"),
            _ => {}
        }
    }
    Ok((attachment, inline))
}

/// Guess from the extension. A leading dot is a hidden file, not an extension.
fn mime_type_for(filename: &str) -> String {
    filename
        .rfind('.')
        .filter(|&dot| dot > 0)
        .and_then(|dot| mime_guess::from_ext(&filename[dot + 1..]).first())
        .map(|mime| mime.essence_str().to_string())
        .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string())
}

fn parse_size(node: &Element) -> Result<u64> {
    let raw = node.required_text()?;
    raw.trim()
        .parse()
        .map_err(|_| SyncError::parse("size", format!("not a number: {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids() -> IssuedIds {
        IssuedIds {
            message_id: "0\0\0c\0m".into(),
            umid: "0\0u".into(),
            folder_id: "0\0f".into(),
        }
    }

    fn text(tag: u16, value: &str) -> Element {
        Element::with_text(tag, value)
    }

    #[test]
    fn test_headers_and_flags() {
        let node = Element::new(0)
            .child(text(em::SUBJECT, "Lunch"))
            .child(text(em::FROM, "\"Ann Lee\" <ann@example.com>"))
            .child(text(em::TO, "bob@example.com, Cy <cy@example.com>"))
            .child(text(em::DATE_RECEIVED, "2024-03-10T09:00:00.000Z"))
            .child(text(em::READ, "1"))
            .child(Element::new(em::FLAG).child(text(em::FLAG_STATUS, "2")));

        let info = parse_full_message(&node, ids()).unwrap();
        assert_eq!(info.subject.as_deref(), Some("Lunch"));
        assert_eq!(info.author.unwrap().address, "ann@example.com");
        assert_eq!(info.to.unwrap().len(), 2);
        assert_eq!(info.date, Some(1_710_061_200_000));
        assert_eq!(info.flags, vec![FLAG_SEEN, FLAG_FLAGGED]);
        assert!(info.folder_ids.contains("0\0f"));
        assert_eq!(info.body_reps.len(), 1);
    }

    #[test]
    fn test_body_and_attachments() {
        let node = Element::new(0)
            .child(
                Element::new(asb::BODY)
                    .child(text(asb::TYPE, "2"))
                    .child(text(asb::ESTIMATED_DATA_SIZE, "4096")),
            )
            .child(
                Element::new(asb::ATTACHMENTS)
                    .child(
                        Element::new(asb::ATTACHMENT)
                            .child(text(asb::DISPLAY_NAME, "report.pdf"))
                            .child(text(asb::FILE_REFERENCE, "ref-1"))
                            .child(text(asb::ESTIMATED_DATA_SIZE, "1200")),
                    )
                    .child(
                        Element::new(asb::ATTACHMENT)
                            .child(text(asb::DISPLAY_NAME, "logo.png"))
                            .child(text(asb::CONTENT_ID, "logo@x"))
                            .child(text(asb::IS_INLINE, "1")),
                    ),
            );

        let info = parse_full_message(&node, ids()).unwrap();
        assert_eq!(info.body_reps[0].body_type, BodyType::Html);
        assert_eq!(info.body_reps[0].size_estimate, 4096);
        assert!(!info.body_reps[0].is_downloaded);

        assert!(info.has_attachments);
        assert_eq!(info.attachments.len(), 1);
        let pdf = &info.attachments[0];
        assert_eq!(pdf.rel_id, "0");
        assert_eq!(pdf.mime_type.as_deref(), Some("application/pdf"));
        assert_eq!(pdf.part.as_deref(), Some("ref-1"));
        assert_eq!(pdf.size_estimate, Some(1200));

        assert_eq!(info.related_parts.len(), 1);
        assert_eq!(info.related_parts[0].content_id.as_deref(), Some("logo@x"));
        // Position counts only regular attachments.
        assert_eq!(info.related_parts[0].rel_id, "1");
    }

    #[test]
    fn test_legacy_body_size() {
        let node = Element::new(0).child(text(em::BODY_SIZE, "77"));
        let info = parse_full_message(&node, ids()).unwrap();
        assert_eq!(info.body_reps[0].body_type, BodyType::Plain);
        assert_eq!(info.body_reps[0].size_estimate, 77);
        assert!(!info.has_attachments);
    }

    #[test]
    fn test_mime_type_guess() {
        assert_eq!(mime_type_for("notes.txt"), "text/plain");
        assert_eq!(mime_type_for(".bashrc"), DEFAULT_MIME_TYPE);
        assert_eq!(mime_type_for("README"), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn test_bad_date_is_an_item_error() {
        let node = Element::new(0).child(text(em::DATE_RECEIVED, "yesterday"));
        assert!(matches!(
            parse_full_message(&node, ids()),
            Err(SyncError::InvalidDate(_))
        ));
    }
}
