//! Inline image references attached to check-ins.
//!
//! Images are stored as `data:<mime>;base64,<payload>` strings next to the
//! record. Resizing and re-encoding happen before an image reaches this crate.

use crate::errors::Error;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

pub const ALLOWED_MIME_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

/// 10 MiB of decoded image bytes.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

pub fn validate_image(mime: &str, size: usize) -> Result<(), Error> {
    if !ALLOWED_MIME_TYPES.contains(&mime) {
        return Err(Error::validation(
            "only JPG, PNG, GIF and WebP images are supported",
        ));
    }
    if size > MAX_IMAGE_BYTES {
        return Err(Error::validation("images must not exceed 10MB"));
    }
    Ok(())
}

pub fn encode_data_url(mime: &str, bytes: &[u8]) -> Result<String, Error> {
    validate_image(mime, bytes.len())?;
    Ok(format!("data:{mime};base64,{}", STANDARD.encode(bytes)))
}

/// Checks a stored reference: a base64 data URL of an allowed type within the size ceiling.
pub fn validate_image_ref(reference: &str) -> Result<(), Error> {
    let invalid = || Error::validation("image must be a base64 data URL");

    let rest = reference.strip_prefix("data:").ok_or_else(invalid)?;
    let (header, payload) = rest.split_once(',').ok_or_else(invalid)?;
    let mime = header.strip_suffix(";base64").ok_or_else(invalid)?;

    // Decoded length from the encoded length, without allocating.
    let padding = payload.bytes().rev().take_while(|b| *b == b'=').count();
    let size = (payload.len() / 4 * 3).saturating_sub(padding);
    validate_image(mime, size)?;

    STANDARD.decode(payload).map_err(|_| invalid())?;
    Ok(())
}

pub fn validate_image_refs(references: &[String]) -> Result<(), Error> {
    references
        .iter()
        .try_for_each(|reference| validate_image_ref(reference))
}
