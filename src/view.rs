use agenda::core::contact::{Contact, ContactFields, Photo};
use agenda::core::validate::FieldErrors;
use agenda::repository::ContactRepository;

/// One contact card: photo or initial, then the details that are present.
pub fn render_card(contact: &Contact) -> String {
    let mut out = String::new();
    let badge = match &contact.photo {
        Photo::Remote(_) => "[photo]".to_string(),
        _ => format!("[{}]", contact.initial()),
    };
    out.push_str(&format!("{} {}  (#{})\n", badge, contact.name, contact.id));
    if let Photo::Remote(url) = &contact.photo {
        out.push_str(&format!("    photo:   {}\n", url));
    }
    for (label, value) in [
        ("email", &contact.email),
        ("phone", &contact.phone),
        ("address", &contact.address),
    ] {
        if !value.is_empty() {
            out.push_str(&format!("    {:<8} {}\n", format!("{}:", label), value));
        }
    }
    out
}

/// The whole list page, including its loading and error states.
pub fn render_list(repo: &ContactRepository) -> String {
    if repo.is_loading() {
        return "Loading...\n".to_string();
    }
    if let Some(error) = repo.error() {
        return format!("Error: {}\n", error);
    }

    let mut out = String::from("Contacts\n========\n");
    if repo.contacts().is_empty() {
        out.push_str("No contacts yet. Add one with `agenda add --name <name>`.\n");
    }
    for contact in repo.contacts() {
        out.push_str(&render_card(contact));
    }
    if let Some(when) = repo.last_fetched() {
        out.push_str(&format!("\nUpdated {}\n", when.format("%Y-%m-%d %H:%M")));
    }
    out
}

pub fn render_field_errors(errors: &FieldErrors) -> String {
    errors
        .iter()
        .map(|(field, message)| format!("  {}: {}\n", field, message))
        .collect()
}

pub fn render_draft(fields: &ContactFields) -> String {
    let photo = match &fields.photo {
        Photo::None => "none".to_string(),
        Photo::Inline(img) => format!("{} ({} bytes, not uploaded)", img.mime, img.data.len()),
        Photo::Remote(url) => url.clone(),
    };
    format!(
        "Draft\n  name:    {}\n  email:   {}\n  phone:   {}\n  address: {}\n  photo:   {}\n",
        fields.name, fields.email, fields.phone, fields.address, photo
    )
}
