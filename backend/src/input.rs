use actix_multipart::{Field, Multipart};
use actix_web::{HttpMessage, HttpRequest, web};
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::{Engine, alphabet};
use futures_util::TryStreamExt;
use shared::PredictRequest;

use crate::error::ServiceError;

/// Standard alphabet with canonical padding. Non-zero bits after the last
/// full byte are ignored.
const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireCanonical),
);

/// Where the image of a `/predict` request came from.
#[derive(Debug)]
pub enum ImageInput {
    Upload(Vec<u8>),
    Base64(String),
}

impl ImageInput {
    /// Multipart requests may carry `file` and `image_base64`; a non-empty
    /// `file` wins. JSON requests carry `image_base64` only.
    pub async fn extract(
        req: &HttpRequest,
        payload: web::Payload,
        limit: usize,
    ) -> Result<Self, ServiceError> {
        let content_type = req.content_type().to_ascii_lowercase();
        match content_type.as_str() {
            "multipart/form-data" => from_multipart(req, payload, limit).await,
            "application/json" => from_json(payload, limit).await,
            _ => Err(ServiceError::NoImage),
        }
    }

    pub fn source(&self) -> &'static str {
        match self {
            ImageInput::Upload(_) => "upload",
            ImageInput::Base64(_) => "base64",
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>, ServiceError> {
        match self {
            ImageInput::Upload(bytes) => Ok(bytes),
            ImageInput::Base64(encoded) => Ok(decode_base64(&encoded)?),
        }
    }
}

/// Standard alphabet with padding. Whitespace is ignored and a
/// `data:<mime>;base64,` prefix is stripped.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let encoded = encoded.trim();
    let data = match encoded.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map_or(rest, |(_, data)| data),
        None => encoded,
    };
    let cleaned: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(cleaned)
}

async fn from_multipart(
    req: &HttpRequest,
    payload: web::Payload,
    limit: usize,
) -> Result<ImageInput, ServiceError> {
    let mut multipart = Multipart::new(req.headers(), payload);
    let mut budget = limit;
    let mut file = None;
    let mut encoded = None;

    while let Some(field) = multipart
        .try_next()
        .await
        .map_err(|e| ServiceError::Payload(e.to_string()))?
    {
        let name = field.name().map(str::to_owned);
        let data = read_field(field, &mut budget, limit).await?;
        match name.as_deref() {
            Some("file") if file.is_none() && !data.is_empty() => file = Some(data),
            Some("image_base64") if encoded.is_none() => {
                let text = String::from_utf8(data).map_err(|_| {
                    ServiceError::Payload("image_base64 field is not UTF-8".into())
                })?;
                encoded = Some(text);
            }
            _ => {}
        }
    }

    match (file, encoded) {
        (Some(bytes), _) => Ok(ImageInput::Upload(bytes)),
        (None, Some(text)) => Ok(ImageInput::Base64(text)),
        (None, None) => Err(ServiceError::NoImage),
    }
}

async fn read_field(
    mut field: Field,
    budget: &mut usize,
    limit: usize,
) -> Result<Vec<u8>, ServiceError> {
    let mut data = Vec::new();
    while let Some(chunk) = field
        .try_next()
        .await
        .map_err(|e| ServiceError::Payload(e.to_string()))?
    {
        *budget = budget
            .checked_sub(chunk.len())
            .ok_or(ServiceError::PayloadTooLarge(limit))?;
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn from_json(mut payload: web::Payload, limit: usize) -> Result<ImageInput, ServiceError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload
        .try_next()
        .await
        .map_err(|e| ServiceError::Payload(e.to_string()))?
    {
        if body.len() + chunk.len() > limit {
            return Err(ServiceError::PayloadTooLarge(limit));
        }
        body.extend_from_slice(&chunk);
    }

    match serde_json::from_slice::<PredictRequest>(&body) {
        Ok(PredictRequest {
            image_base64: Some(encoded),
        }) => Ok(ImageInput::Base64(encoded)),
        Ok(_) => Err(ServiceError::NoImage),
        Err(e) => {
            log::debug!("Unreadable JSON body: {}", e);
            Err(ServiceError::NoImage)
        }
    }
}
