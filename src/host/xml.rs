//! Field extraction from host XML responses.
//!
//! Every response has a `<root status_code=".." status_message="..">` element.
//! Reaching it validates the status, so a field can never be read out of an
//! error envelope.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::host::HostError;

/// Code and message reported for the host's "missing audio device" quirk.
pub const AUDIO_DEVICE_CODE: i32 = 418;
pub const AUDIO_DEVICE_MESSAGE: &str = "Missing audio capture device. Reinstall GeForce Experience.";

/// Text directly inside the first `<tag>` element, trimmed.
///
/// Returns `Ok(None)` if the document ends without one. Fails with
/// [`HostError::Status`] when the root element reports a non-200 status.
pub fn find_text(xml: &str, tag: &str) -> Result<Option<String>, HostError> {
    scan(xml, Some(tag))
}

/// Like [`find_text`], but a missing element is an error.
pub fn require_text(xml: &str, tag: &str) -> Result<String, HostError> {
    find_text(xml, tag)?.ok_or_else(|| HostError::MissingField(tag.to_string()))
}

/// Check the root element's status without extracting anything.
pub fn verify_response_status(xml: &str) -> Result<(), HostError> {
    scan(xml, None).map(|_| ())
}

fn scan(xml: &str, wanted: Option<&str>) -> Result<Option<String>, HostError> {
    let mut reader = Reader::from_str(xml);
    let mut open: Vec<Vec<u8>> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                if start.name().as_ref() == b"root" {
                    check_status(&start)?;
                    if wanted.is_none() {
                        return Ok(None);
                    }
                }
                open.push(start.name().as_ref().to_vec());
            }
            Event::Empty(start) => {
                if start.name().as_ref() == b"root" {
                    check_status(&start)?;
                    if wanted.is_none() {
                        return Ok(None);
                    }
                }
            }
            Event::End(_) => {
                open.pop();
            }
            Event::Text(text) => {
                if wanted.is_some_and(|tag| is_current(&open, tag)) {
                    let value = text.unescape().map_err(xml_error)?;
                    return Ok(Some(value.trim().to_string()));
                }
            }
            Event::CData(data) => {
                if wanted.is_some_and(|tag| is_current(&open, tag)) {
                    let value = String::from_utf8_lossy(&data);
                    return Ok(Some(value.trim().to_string()));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn is_current(open: &[Vec<u8>], tag: &str) -> bool {
    open.last().is_some_and(|name| name.as_slice() == tag.as_bytes())
}

fn check_status(root: &BytesStart<'_>) -> Result<(), HostError> {
    let raw = attribute(root, "status_code")?.ok_or_else(|| HostError::MalformedStatus(String::new()))?;
    let code = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| HostError::MalformedStatus(raw.clone()))? as i32;

    if code == 200 {
        return Ok(());
    }

    let message = attribute(root, "status_message")?.unwrap_or_default();
    Err(status_error(code, message))
}

/// Map a root status to an error, applying the audio-device remap.
pub fn status_error(code: i32, message: String) -> HostError {
    if code == -1 && message == "Invalid" {
        HostError::Status {
            code: AUDIO_DEVICE_CODE,
            message: AUDIO_DEVICE_MESSAGE.to_string(),
        }
    } else {
        HostError::Status { code, message }
    }
}

fn attribute(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, HostError> {
    match start.try_get_attribute(name).map_err(xml_error)? {
        Some(attr) => Ok(Some(attr.unescape_value().map_err(xml_error)?.into_owned())),
        None => Ok(None),
    }
}

fn xml_error(err: impl std::fmt::Display) -> HostError {
    HostError::Xml(err.to_string())
}
