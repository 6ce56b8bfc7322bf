//! `multipart/related` framing for SOAP-with-attachments messages

use super::envelope::Attachment;
use super::errors::CodecError;
use bytes::Bytes;
use uuid::Uuid;

/// Content-ID of the SOAP root part
pub const ROOT_CONTENT_ID: &str = "root.message@as4-core";

const CRLF: &[u8] = b"\r\n";

/// Decoded multipart message
#[derive(Debug, Clone)]
pub struct RelatedParts {
    pub root: Vec<u8>,
    pub attachments: Vec<Attachment>,
}

pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/related")
}

/// Frame the SOAP part and attachments, returning the Content-Type header and body
pub fn write_related(soap: &[u8], soap_type: &str, attachments: &[Attachment]) -> (String, Vec<u8>) {
    let boundary = format!("MIMEBoundary_{}", Uuid::new_v4().simple());
    let attachment_len: usize = attachments.iter().map(|a| a.data.len() + 256).sum();
    let mut body = Vec::with_capacity(soap.len() + attachment_len + 256);

    write_part(
        &mut body,
        &boundary,
        &format!("{}; charset=UTF-8", soap_type),
        ROOT_CONTENT_ID,
        soap,
    );
    for attachment in attachments {
        write_part(
            &mut body,
            &boundary,
            &attachment.mime_type,
            &attachment.content_id,
            &attachment.data,
        );
    }
    body.extend_from_slice(format!("--{}--", boundary).as_bytes());
    body.extend_from_slice(CRLF);

    let content_type = format!(
        "multipart/related; boundary=\"{}\"; type=\"{}\"; start=\"<{}>\"",
        boundary, soap_type, ROOT_CONTENT_ID
    );
    (content_type, body)
}

fn write_part(out: &mut Vec<u8>, boundary: &str, content_type: &str, content_id: &str, data: &[u8]) {
    let headers = format!(
        "--{}\r\nContent-Type: {}\r\nContent-Transfer-Encoding: binary\r\nContent-ID: <{}>\r\n\r\n",
        boundary, content_type, content_id
    );
    out.extend_from_slice(headers.as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

/// Split a `multipart/related` body into its root part and attachments
pub fn parse_related(content_type: &str, body: &[u8]) -> Result<RelatedParts, CodecError> {
    let boundary = content_type_param(content_type, "boundary")
        .ok_or_else(|| CodecError::Mime("missing boundary parameter".to_string()))?;
    let start = content_type_param(content_type, "start")
        .map(|s| s.trim_start_matches('<').trim_end_matches('>').to_string());

    let delimiter = format!("--{}", boundary).into_bytes();
    let positions = delimiter_positions(body, &delimiter);
    if positions.is_empty() {
        return Err(CodecError::Mime("no MIME boundary found in body".to_string()));
    }

    let mut parts = Vec::new();
    let mut closed = false;
    for (index, &position) in positions.iter().enumerate() {
        let after = position + delimiter.len();
        if body[after..].starts_with(b"--") {
            closed = true;
            break;
        }
        let Some(next) = positions.get(index + 1) else {
            break;
        };
        let content_start = skip_line(body, after);
        // the CRLF preceding the next delimiter belongs to the delimiter
        let content_end = next.saturating_sub(CRLF.len()).max(content_start);
        parts.push(parse_part(&body[content_start..content_end])?);
    }

    if !closed {
        return Err(CodecError::Mime("missing closing boundary".to_string()));
    }

    let root_index = match &start {
        Some(start) => parts
            .iter()
            .position(|p| p.content_id.as_deref() == Some(start.as_str()))
            .ok_or_else(|| CodecError::Mime(format!("start part <{}> not found", start)))?,
        None => 0,
    };
    if parts.is_empty() {
        return Err(CodecError::Mime("multipart message has no parts".to_string()));
    }
    let root = parts.remove(root_index);

    let attachments = parts
        .into_iter()
        .map(|part| {
            let content_id = part
                .content_id
                .ok_or_else(|| CodecError::Mime("attachment without Content-ID".to_string()))?;
            Ok(Attachment {
                content_id,
                mime_type: part
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                data: Bytes::from(part.data),
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    Ok(RelatedParts {
        root: root.data,
        attachments,
    })
}

struct MimePart {
    content_type: Option<String>,
    content_id: Option<String>,
    data: Vec<u8>,
}

fn parse_part(raw: &[u8]) -> Result<MimePart, CodecError> {
    let split = find(raw, b"\r\n\r\n", 0)
        .ok_or_else(|| CodecError::Mime("part without header terminator".to_string()))?;
    let headers = std::str::from_utf8(&raw[..split])
        .map_err(|_| CodecError::Mime("part headers are not UTF-8".to_string()))?;

    let mut part = MimePart {
        content_type: None,
        content_id: None,
        data: raw[split + 4..].to_vec(),
    };
    for line in headers.split("\r\n") {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("content-type") {
            part.content_type = Some(value.to_string());
        } else if name.trim().eq_ignore_ascii_case("content-id") {
            part.content_id = Some(
                value
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string(),
            );
        }
    }
    Ok(part)
}

fn content_type_param(content_type: &str, name: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case(name)
            .then(|| value.trim().trim_matches('"').to_string())
    })
}

/// Offsets of delimiters that start a line
fn delimiter_positions(body: &[u8], delimiter: &[u8]) -> Vec<usize> {
    let mut positions = Vec::new();
    let mut from = 0;
    while let Some(position) = find(body, delimiter, from) {
        if position == 0 || body[..position].ends_with(CRLF) {
            positions.push(position);
        }
        from = position + delimiter.len();
    }
    positions
}

fn skip_line(body: &[u8], from: usize) -> usize {
    find(body, CRLF, from).map_or(body.len(), |pos| pos + CRLF.len())
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|pos| pos + from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_and_parse_related() {
        let attachments = vec![
            Attachment::new("a@test", "application/xml", &b"<a/>"[..]),
            Attachment::new("b@test", "application/octet-stream", vec![0u8, 13, 10, 45, 45, 255]),
        ];
        let (content_type, body) = write_related(b"<soap/>", "application/soap+xml", &attachments);
        assert!(is_multipart(&content_type));

        let parts = parse_related(&content_type, &body).unwrap();
        assert_eq!(parts.root, b"<soap/>");
        assert_eq!(parts.attachments, attachments);
    }

    #[test]
    fn test_content_type_params() {
        let ct = "multipart/related; boundary=\"abc\"; type=\"application/soap+xml\"; start=\"<root>\"";
        assert_eq!(content_type_param(ct, "boundary").as_deref(), Some("abc"));
        assert_eq!(content_type_param(ct, "START").as_deref(), Some("<root>"));
        assert_eq!(content_type_param(ct, "charset"), None);
    }

    #[test]
    fn test_missing_closing_boundary() {
        let body = b"--b\r\nContent-ID: <r>\r\n\r\n<soap/>\r\n";
        let result = parse_related("multipart/related; boundary=b", body);
        assert!(matches!(result, Err(CodecError::Mime(_))));
    }

    #[test]
    fn test_missing_boundary_param() {
        let result = parse_related("multipart/related", b"--x--\r\n");
        assert!(matches!(result, Err(CodecError::Mime(_))));
    }

    #[test]
    fn test_root_selected_by_start_parameter() {
        let body = b"--b\r\nContent-ID: <att>\r\nContent-Type: text/plain\r\n\r\nhello\r\n--b\r\nContent-ID: <root>\r\n\r\n<soap/>\r\n--b--\r\n";
        let parts = parse_related("multipart/related; boundary=b; start=\"<root>\"", body).unwrap();
        assert_eq!(parts.root, b"<soap/>");
        assert_eq!(parts.attachments.len(), 1);
        assert_eq!(parts.attachments[0].content_id, "att");
        assert_eq!(&parts.attachments[0].data[..], b"hello");
    }
}
