use crate::error::Error;
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::Multipart;

/// One buffered part of a multipart camera request.
#[derive(Debug, Clone)]
pub struct FormPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FormPart {
    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.data).ok()
    }

    fn lower_file_name(&self) -> String {
        self.file_name.as_deref().unwrap_or_default().to_ascii_lowercase()
    }

    fn lower_content_type(&self) -> String {
        self.content_type.as_deref().unwrap_or_default().to_ascii_lowercase()
    }

    pub fn looks_like_xml(&self) -> bool {
        self.is_file()
            && (self.lower_file_name().ends_with(".xml") || self.lower_content_type().contains("xml"))
    }

    pub fn looks_like_image(&self) -> bool {
        if !self.is_file() {
            return false;
        }
        let name = self.lower_file_name();
        self.lower_content_type().starts_with("image/")
            || [".jpg", ".jpeg", ".png", ".webp"]
                .iter()
                .any(|ext| name.ends_with(ext))
    }
}

/// Drain a multipart body into memory.
pub async fn collect_parts(mut multipart: Multipart) -> Result<Vec<FormPart>> {
    let mut parts = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::InvalidInput(format!("invalid multipart payload: {}", e)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to read part '{}': {}", name, e)))?;

        parts.push(FormPart {
            name,
            file_name,
            content_type,
            data,
        });
    }

    Ok(parts)
}

#[cfg(test)]
pub(crate) fn file_part(name: &str, file_name: &str, content_type: &str, data: &[u8]) -> FormPart {
    FormPart {
        name: name.to_string(),
        file_name: Some(file_name.to_string()),
        content_type: Some(content_type.to_string()),
        data: Bytes::copy_from_slice(data),
    }
}

#[cfg(test)]
pub(crate) fn text_part(name: &str, value: &str) -> FormPart {
    FormPart {
        name: name.to_string(),
        file_name: None,
        content_type: None,
        data: Bytes::copy_from_slice(value.as_bytes()),
    }
}
