use leptos::ev::SubmitEvent;
use leptos::prelude::*;
use leptos::task::spawn_local;
use wasm_bindgen_futures::JsFuture;
use web_sys::HtmlInputElement;

use so_core::profile::{avatar_from_upload, mime_from_extension, parse_interests, ProfileDraft};

use crate::state::use_app_state;

/// MIME type of an upload, guessing from the file name when the browser
/// reports none.
fn upload_mime(file: &web_sys::File) -> String {
    let reported = file.type_();
    if !reported.is_empty() {
        return reported;
    }
    file.name()
        .rsplit_once('.')
        .and_then(|(_, ext)| mime_from_extension(ext))
        .unwrap_or_default()
        .to_string()
}

async fn read_avatar(file: web_sys::File) -> Result<String, String> {
    let mime = upload_mime(&file);
    let buffer = JsFuture::from(file.array_buffer())
        .await
        .map_err(|e| e.as_string().unwrap_or_else(|| "could not read file".to_string()))?;
    let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
    avatar_from_upload(&mime, &bytes).map_err(|e| e.to_string())
}

#[component]
pub fn ProfilePage() -> impl IntoView {
    let state = use_app_state();
    let record = state.ui().record();
    let initial = match (&record.profile, &record.session) {
        (Some(profile), _) => ProfileDraft::from_profile(profile),
        (None, Some(session)) => ProfileDraft {
            name: session.label(),
            avatar: session.avatar.clone(),
            ..ProfileDraft::default()
        },
        (None, None) => ProfileDraft::default(),
    };

    let name = RwSignal::new(initial.name);
    let bio = RwSignal::new(initial.bio);
    let interests = RwSignal::new(initial.interests);
    let avatar = RwSignal::new(initial.avatar);
    let error = RwSignal::new(None::<String>);
    let tags = Memo::new(move |_| interests.with(|raw| parse_interests(raw)));

    let on_file = move |ev: leptos::ev::Event| {
        let input = event_target::<HtmlInputElement>(&ev);
        let Some(file) = input.files().and_then(|files| files.get(0)) else {
            return;
        };
        spawn_local(async move {
            match read_avatar(file).await {
                Ok(data_url) => {
                    avatar.try_set(Some(data_url));
                    error.try_set(None);
                }
                Err(message) => {
                    error.try_set(Some(message));
                }
            }
        });
    };

    let save = move |ev: SubmitEvent| {
        ev.prevent_default();
        let draft = ProfileDraft {
            name: name.get_untracked(),
            bio: bio.get_untracked(),
            interests: interests.get_untracked(),
            avatar: avatar.get_untracked(),
        };
        match state.ui().save_profile(draft) {
            Ok(saved) => {
                name.set(saved.name);
                error.set(None);
            }
            Err(e) => error.set(Some(e.to_string())),
        }
    };

    view! {
        <section class="profile-page">
            <h1>"Your profile"</h1>
            <form class="profile-form" on:submit=save>
                <div class="profile-avatar">
                    {move || match avatar.get() {
                        Some(src) => view! { <img class="avatar-preview" src=src alt="Avatar" /> }.into_any(),
                        None => view! { <div class="avatar-preview avatar-empty">"No photo"</div> }.into_any(),
                    }}
                    <label for="profile-avatar">"Photo"</label>
                    <input id="profile-avatar" type="file" accept="image/*" on:change=on_file />
                    <Show when=move || avatar.with(Option::is_some)>
                        <button type="button" class="btn-link" on:click=move |_| avatar.set(None)>
                            "Remove photo"
                        </button>
                    </Show>
                </div>

                <label for="profile-name">"Name"</label>
                <input
                    id="profile-name"
                    type="text"
                    prop:value=move || name.get()
                    on:input=move |ev| name.set(event_target_value(&ev))
                />

                <label for="profile-bio">"Bio"</label>
                <textarea
                    id="profile-bio"
                    prop:value=move || bio.get()
                    on:input=move |ev| bio.set(event_target_value(&ev))
                ></textarea>

                <label for="profile-interests">"Interests"</label>
                <input
                    id="profile-interests"
                    type="text"
                    placeholder="music, hiking, rust"
                    prop:value=move || interests.get()
                    on:input=move |ev| interests.set(event_target_value(&ev))
                />
                <ul class="tag-preview" aria-label="Interest tags">
                    <For each=move || tags.get() key=|tag| tag.clone() let:tag>
                        <li class="tag">{tag}</li>
                    </For>
                </ul>

                {move || error.get().map(|message| view! {
                    <p class="form-error" role="alert">{message}</p>
                })}
                <button type="submit" class="btn-primary">"Save profile"</button>
            </form>
        </section>
    }
}
