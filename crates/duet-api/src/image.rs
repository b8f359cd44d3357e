use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::{DateTime, Utc};
use duet_core::event::{EventImage, ImageKind};
use duet_types::api::{EventImagePayload, EventImageResponse};

use crate::error::{ApiError, ApiResult};

/// Avatars are capped at 2 MiB of decoded data.
const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// Browsers hand over data URLs; keep only the payload.
fn strip_data_url(data: &str) -> &str {
    match data.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => data,
    }
}

fn decode_base64(data: &str) -> ApiResult<Vec<u8>> {
    let bytes = B64
        .decode(strip_data_url(data).trim())
        .map_err(|_| ApiError::bad_request("image data is not valid base64"))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("image data is empty"));
    }
    Ok(bytes)
}

/// Validate an image attached by a client. An empty `type` means no image.
pub fn parse_image(
    payload: Option<EventImagePayload>,
    now: DateTime<Utc>,
) -> ApiResult<Option<EventImage>> {
    let Some(payload) = payload else {
        return Ok(None);
    };
    let (kind, size) = match payload.kind.as_str() {
        "" => return Ok(None),
        "base64" => (ImageKind::Base64, decode_base64(&payload.data)?.len() as u64),
        "url" => {
            if !(payload.data.starts_with("https://") || payload.data.starts_with("http://")) {
                return Err(ApiError::bad_request("image url must be http or https"));
            }
            (ImageKind::Url, 0)
        }
        other => return Err(ApiError::bad_request(format!("unknown image type '{other}'"))),
    };

    Ok(Some(EventImage {
        kind,
        data: payload.data,
        filename: payload.filename,
        size,
        uploaded_at: now,
    }))
}

/// Validate a profile avatar. Only base64 data is accepted and it is stored
/// without any `data:` prefix.
pub fn parse_avatar(data: &str, now: DateTime<Utc>) -> ApiResult<EventImage> {
    let bytes = decode_base64(data)?;
    if bytes.len() > MAX_AVATAR_BYTES {
        return Err(ApiError::bad_request("avatar must be at most 2 MiB"));
    }
    Ok(EventImage {
        kind: ImageKind::Base64,
        data: strip_data_url(data).trim().to_string(),
        filename: "avatar".into(),
        size: bytes.len() as u64,
        uploaded_at: now,
    })
}

pub fn to_response(image: EventImage) -> EventImageResponse {
    EventImageResponse {
        kind: match image.kind {
            ImageKind::Base64 => "base64",
            ImageKind::Url => "url",
        }
        .to_string(),
        data: image.data,
        filename: image.filename,
        size: image.size,
        uploaded_at: image.uploaded_at,
    }
}
