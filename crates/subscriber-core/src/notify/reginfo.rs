//! reg-event state documents (RFC 3680)
//!
//! Builds the `application/reginfo+xml` body carried on every NOTIFY,
//! and parses one back into its reported contacts. Bodies always carry
//! full state; partial documents are never produced.

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::aor::AssociatedUris;
use crate::classify::{ClassifiedBinding, ContactEvent};
use crate::error::{Result, SubscriberError};

/// XML namespace of the reginfo document
pub const REGINFO_XMLNS: &str = "urn:ietf:params:xml:ns:reginfo";

/// The `state` attribute of a `<contact>` element.
pub fn contact_state(event: ContactEvent) -> &'static str {
    if event.is_terminal() {
        "terminated"
    } else {
        "active"
    }
}

/// The `event` attribute of a `<contact>` element.
pub fn contact_event(event: ContactEvent) -> &'static str {
    match event {
        ContactEvent::Registered => "registered",
        ContactEvent::Created => "created",
        ContactEvent::Refreshed => "refreshed",
        ContactEvent::Shortened => "shortened",
        ContactEvent::Expired => "expired",
        ContactEvent::Deactivated => "deactivated",
        ContactEvent::Unregistered => "unregistered",
    }
}

/// Build a full-state reginfo body.
///
/// One `<registration>` element per associated URI, in set order, each
/// reporting every classified contact. Barred identities are present
/// but marked terminated; unbarred ones carry the AoR-level
/// registration state. The `version` attribute is the AoR notify CSeq
/// in effect after the mutation.
pub fn build_reginfo(
    associated_uris: &AssociatedUris,
    classified_bindings: &[ClassifiedBinding<'_>],
    registration_active: bool,
    version: u32,
) -> Result<String> {
    let mut writer = Writer::new(Vec::new());
    let build_err = |e: &dyn std::fmt::Display| SubscriberError::NotifyBuildFailed(e.to_string());

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(|e| build_err(&e))?;

    let version_text = version.to_string();
    let mut reginfo = BytesStart::new("reginfo");
    reginfo.push_attribute(("xmlns", REGINFO_XMLNS));
    reginfo.push_attribute(("version", version_text.as_str()));
    reginfo.push_attribute(("state", "full"));
    writer
        .write_event(Event::Start(reginfo))
        .map_err(|e| build_err(&e))?;

    for (index, associated_uri) in associated_uris.iter().enumerate() {
        let registration_state = if associated_uri.barred || !registration_active {
            "terminated"
        } else {
            "active"
        };
        let id_text = index.to_string();
        let mut registration = BytesStart::new("registration");
        registration.push_attribute(("aor", associated_uri.uri.as_str()));
        registration.push_attribute(("id", id_text.as_str()));
        registration.push_attribute(("state", registration_state));
        writer
            .write_event(Event::Start(registration))
            .map_err(|e| build_err(&e))?;

        for cb in classified_bindings {
            let mut contact = BytesStart::new("contact");
            contact.push_attribute(("id", cb.id));
            contact.push_attribute(("state", contact_state(cb.event)));
            contact.push_attribute(("event", contact_event(cb.event)));
            writer
                .write_event(Event::Start(contact))
                .map_err(|e| build_err(&e))?;
            writer
                .write_event(Event::Start(BytesStart::new("uri")))
                .map_err(|e| build_err(&e))?;
            writer
                .write_event(Event::Text(BytesText::new(&cb.binding.uri)))
                .map_err(|e| build_err(&e))?;
            writer
                .write_event(Event::End(BytesEnd::new("uri")))
                .map_err(|e| build_err(&e))?;
            writer
                .write_event(Event::End(BytesEnd::new("contact")))
                .map_err(|e| build_err(&e))?;
        }

        writer
            .write_event(Event::End(BytesEnd::new("registration")))
            .map_err(|e| build_err(&e))?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("reginfo")))
        .map_err(|e| build_err(&e))?;

    String::from_utf8(writer.into_inner())
        .map_err(|e| SubscriberError::NotifyBuildFailed(e.to_string()))
}

/// One contact as reported by a reginfo body
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReportedContact {
    pub aor_uri: String,
    pub registration_state: String,
    pub contact_id: String,
    pub state: String,
    pub event: String,
    pub uri: String,
}

/// Parse a reginfo body back into its version and reported contacts.
pub fn parse_reginfo(xml: &str) -> Result<(u32, Vec<ReportedContact>)> {
    let mut reader = Reader::from_str(xml);
    let mut version = 0u32;
    let mut contacts = Vec::new();

    let mut current_aor = String::new();
    let mut current_registration_state = String::new();
    let mut current_contact: Option<ReportedContact> = None;
    let mut in_uri = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"reginfo" => {
                    let v = attribute(&e, b"version")?;
                    version = v.parse().map_err(|_| {
                        SubscriberError::Internal(format!("bad reginfo version: {}", v))
                    })?;
                }
                b"registration" => {
                    current_aor = attribute(&e, b"aor")?;
                    current_registration_state = attribute(&e, b"state")?;
                }
                b"contact" => {
                    current_contact = Some(ReportedContact {
                        aor_uri: current_aor.clone(),
                        registration_state: current_registration_state.clone(),
                        contact_id: attribute(&e, b"id")?,
                        state: attribute(&e, b"state")?,
                        event: attribute(&e, b"event")?,
                        uri: String::new(),
                    });
                }
                b"uri" => in_uri = true,
                _ => {}
            },
            Event::Text(t) if in_uri => {
                if let Some(contact) = current_contact.as_mut() {
                    contact.uri = t
                        .unescape()
                        .map_err(|e| SubscriberError::Internal(e.to_string()))?
                        .into_owned();
                }
            }
            Event::End(e) => match e.name().as_ref() {
                b"uri" => in_uri = false,
                b"contact" => {
                    if let Some(contact) = current_contact.take() {
                        contacts.push(contact);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((version, contacts))
}

fn attribute(element: &BytesStart<'_>, name: &[u8]) -> Result<String> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| SubscriberError::Internal(e.to_string()))?;
        if attr.key.as_ref() == name {
            return Ok(attr
                .unescape_value()
                .map_err(|e| SubscriberError::Internal(e.to_string()))?
                .into_owned());
        }
    }
    Err(SubscriberError::Internal(format!(
        "missing attribute {}",
        String::from_utf8_lossy(name)
    )))
}
