use uuid::Uuid;

use crate::error::MultipartError;

/// A file part pulled out of a multipart/form-data body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field_name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

/// Returns the boundary from a `multipart/form-data` content type.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, MultipartError> {
    if !content_type
        .trim_start()
        .to_ascii_lowercase()
        .starts_with("multipart/form-data")
    {
        return Err(MultipartError::NotMultipart);
    }

    content_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .find(|b| !b.is_empty())
        .ok_or(MultipartError::MissingBoundary)
}

/// Finds the part named `field` that carries a filename.
///
/// Works on raw bytes so binary uploads survive intact. `Ok(None)` means the
/// body was well formed but had no such file part.
///
/// After the opening boundary, a delimiter only counts when it starts a line
/// (`CRLF--boundary`), so part data may contain `--boundary` mid-line.
pub fn find_file_part(
    body: &[u8],
    boundary: &str,
    field: &str,
) -> Result<Option<FilePart>, MultipartError> {
    let opening = format!("--{}", boundary).into_bytes();
    let delimiter = format!("\r\n--{}", boundary).into_bytes();
    let first = find(body, &opening, 0).ok_or(MultipartError::Malformed)?;
    let mut cursor = first + opening.len();

    loop {
        if body[cursor..].starts_with(b"--") {
            return Ok(None);
        }
        let next = find(body, &delimiter, cursor).ok_or(MultipartError::Malformed)?;
        let section = &body[cursor..next];
        let section = section.strip_prefix(b"\r\n").unwrap_or(section);

        if let Some(part) = parse_part(section)? {
            if part.field_name == field {
                return Ok(Some(part));
            }
        }
        cursor = next + delimiter.len();
    }
}

fn parse_part(section: &[u8]) -> Result<Option<FilePart>, MultipartError> {
    let header_end = find(section, b"\r\n\r\n", 0).ok_or(MultipartError::Malformed)?;
    let headers = String::from_utf8_lossy(&section[..header_end]);
    let data = &section[header_end + 4..];

    let mut field_name = None;
    let mut file_name = None;
    let mut content_type = None;

    for line in headers.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim().to_ascii_lowercase();
        if name == "content-disposition" {
            field_name = disposition_param(value, "name");
            file_name = disposition_param(value, "filename");
        } else if name == "content-type" {
            content_type = Some(value.trim().to_string());
        }
    }

    match (field_name, file_name) {
        (Some(field_name), Some(file_name)) => Ok(Some(FilePart {
            field_name,
            file_name: if file_name.is_empty() {
                "uploaded_file".to_string()
            } else {
                file_name
            },
            content_type,
            data: data.to_vec(),
        })),
        _ => Ok(None),
    }
}

fn disposition_param(value: &str, key: &str) -> Option<String> {
    value.split(';').find_map(|param| {
        let (k, v) = param.trim().split_once('=')?;
        (k.trim() == key).then(|| v.trim().trim_matches('"').to_string())
    })
}

/// Encodes a single `file` part for an outbound upload. Returns the
/// `Content-Type` header value and the body.
pub fn encode_file_part(
    field: &str,
    file_name: &str,
    content_type: &str,
    data: &[u8],
) -> (String, Vec<u8>) {
    let boundary = format!("----vtscan{}", Uuid::new_v4().simple());
    let escaped_name = file_name.replace('"', "%22");

    let mut body = Vec::with_capacity(data.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
            field, escaped_name
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", content_type).as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

    (format!("multipart/form-data; boundary={}", boundary), body)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}
