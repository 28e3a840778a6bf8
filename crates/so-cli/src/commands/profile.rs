use std::path::{Path, PathBuf};

use anyhow::Context;
use so_core::profile::{avatar_from_upload, mime_from_extension, ProfileDraft};
use so_core::types::Profile;

use super::Ui;

/// Field changes requested on the command line.
#[derive(Debug, Default)]
pub struct ProfileEdits {
    pub name: Option<String>,
    pub bio: Option<String>,
    pub interests: Option<String>,
    pub avatar: Option<PathBuf>,
    pub clear_avatar: bool,
}

pub fn show(ui: &Ui) {
    let Some(profile) = ui.record().profile else {
        println!("No profile saved yet. Create one with `so profile set --name <name>`.");
        return;
    };
    println!("Name:      {}", profile.name);
    if !profile.bio.is_empty() {
        println!("Bio:       {}", profile.bio);
    }
    if profile.interests.is_empty() {
        println!("Interests: -");
    } else {
        println!("Interests: {}", profile.interests.join(", "));
    }
    println!(
        "Avatar:    {}",
        profile.avatar.as_deref().map_or("none", avatar_kind)
    );
}

fn avatar_kind(avatar: &str) -> &'static str {
    if avatar.starts_with("data:") {
        "uploaded image"
    } else {
        "linked image"
    }
}

/// Read an image file into a `data:` URL avatar.
fn load_avatar(path: &Path) -> anyhow::Result<String> {
    let mime = path
        .extension()
        .and_then(|e| e.to_str())
        .and_then(mime_from_extension)
        .unwrap_or("application/octet-stream");
    let bytes = std::fs::read(path)
        .with_context(|| format!("Could not read avatar file {}", path.display()))?;
    Ok(avatar_from_upload(mime, &bytes)?)
}

/// Overlay `edits` on the stored profile, keeping fields that were not given.
pub fn merge(existing: Option<&Profile>, edits: ProfileEdits) -> anyhow::Result<ProfileDraft> {
    let mut draft = existing.map(ProfileDraft::from_profile).unwrap_or_default();
    if let Some(name) = edits.name {
        draft.name = name;
    }
    if let Some(bio) = edits.bio {
        draft.bio = bio;
    }
    if let Some(interests) = edits.interests {
        draft.interests = interests;
    }
    if edits.clear_avatar {
        draft.avatar = None;
    } else if let Some(path) = edits.avatar {
        draft.avatar = Some(load_avatar(&path)?);
    }
    Ok(draft)
}

pub fn set(ui: &Ui, edits: ProfileEdits) -> anyhow::Result<()> {
    let existing = ui.record().profile;
    let draft = merge(existing.as_ref(), edits)?;
    let saved = ui.save_profile(draft)?;
    println!("Profile saved for {}", saved.name);
    if !saved.interests.is_empty() {
        println!("Interests: {}", saved.interests.join(", "));
    }
    Ok(())
}
