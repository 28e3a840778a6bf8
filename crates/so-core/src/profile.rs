//! Profile editing rules: interest-tag parsing, save validation and avatar
//! uploads.

use base64::Engine as _;

use crate::error::ValidationError;
use crate::types::Profile;

/// Split a comma-separated interests field into tags.
///
/// Tags are trimmed, empties dropped, and duplicates removed keeping the
/// first occurrence, so the result is an ordered set.
pub fn parse_interests(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Raw form values from the profile editor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileDraft {
    pub name: String,
    pub bio: String,
    pub interests: String,
    pub avatar: Option<String>,
}

impl ProfileDraft {
    /// Pre-fill the form from a stored profile.
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            name: profile.name.clone(),
            bio: profile.bio.clone(),
            interests: profile.interests.join(","),
            avatar: profile.avatar.clone(),
        }
    }

    /// Tags as they would be saved, for the live preview.
    pub fn tag_preview(&self) -> Vec<String> {
        parse_interests(&self.interests)
    }

    /// Validate and normalise into a [`Profile`].
    pub fn into_profile(self) -> Result<Profile, ValidationError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyField("name"));
        }
        Ok(Profile {
            name: name.to_string(),
            bio: self.bio.trim().to_string(),
            interests: parse_interests(&self.interests),
            avatar: self.avatar.filter(|a| !a.is_empty()),
        })
    }
}

/// Turn an uploaded file into a `data:` URL avatar reference.
///
/// Only `image/*` MIME types are accepted.
pub fn avatar_from_upload(mime: &str, bytes: &[u8]) -> Result<String, ValidationError> {
    let mime = mime.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") {
        return Err(ValidationError::NotAnImage(if mime.is_empty() {
            "unknown type".to_string()
        } else {
            mime
        }));
    }
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(format!("data:{mime};base64,{encoded}"))
}

/// Guess an image MIME type from a file extension.
pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interests_are_trimmed_and_deduplicated() {
        assert_eq!(
            parse_interests(" rust, music ,, rust,  , hiking"),
            vec!["rust", "music", "hiking"]
        );
        assert!(parse_interests("   ").is_empty());
    }

    #[test]
    fn empty_name_is_rejected() {
        let draft = ProfileDraft {
            name: "   ".into(),
            ..Default::default()
        };
        assert_eq!(
            draft.into_profile().unwrap_err(),
            ValidationError::EmptyField("name")
        );
    }

    #[test]
    fn draft_normalises_fields() {
        let profile = ProfileDraft {
            name: "  Aida ".into(),
            bio: " hi \n".into(),
            interests: "art,code".into(),
            avatar: Some(String::new()),
        }
        .into_profile()
        .unwrap();
        assert_eq!(profile.name, "Aida");
        assert_eq!(profile.bio, "hi");
        assert_eq!(profile.interests, vec!["art", "code"]);
        assert!(profile.avatar.is_none());
    }

    #[test]
    fn avatar_upload_requires_image_mime() {
        let err = avatar_from_upload("application/pdf", b"%PDF").unwrap_err();
        assert_eq!(err, ValidationError::NotAnImage("application/pdf".into()));

        let url = avatar_from_upload("image/png", &[1, 2, 3]).unwrap();
        assert_eq!(url, "data:image/png;base64,AQID");
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(mime_from_extension("JPG"), Some("image/jpeg"));
        assert_eq!(mime_from_extension("txt"), None);
    }
}
