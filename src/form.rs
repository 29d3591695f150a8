use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::core::contact::{Contact, ContactFields, ContactId, InlineImage, Photo};
use crate::core::draft::DraftStore;
use crate::core::validate::{Field, FieldErrors, validate_fields};
use crate::error::Result;
use crate::repository::ContactRepository;

pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

const SUBMIT_FAILED: &str = "Failed to save contact. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    Create,
    Edit(ContactId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    New,
    EditingExisting(ContactId),
    Submitting,
    Error(String),
    /// Saved successfully; the caller should leave the form.
    Saved(ContactId),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("{} field(s) failed validation", .0.len())]
    Invalid(FieldErrors),
    #[error("{0}")]
    Failed(String),
}

/// An image file picked by the user.
///
/// Files over [`MAX_PHOTO_BYTES`] are not read; only their size is kept.
#[derive(Debug, Clone)]
pub struct PhotoFile {
    pub mime: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

impl PhotoFile {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            size: bytes.len() as u64,
            bytes,
        }
    }

    /// Read a file from disk. The MIME type comes from the extension, or
    /// from the leading bytes when the extension is unknown.
    pub fn read(path: &Path) -> Result<Self> {
        let size = std::fs::metadata(path)?.len();
        let mut head = Vec::with_capacity(16);
        File::open(path)?.take(16).read_to_end(&mut head)?;

        let mime = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(|e| mime_for_extension(&e.to_ascii_lowercase()))
            .or_else(|| sniff_mime(&head))
            .unwrap_or("application/octet-stream");

        let bytes = if size > MAX_PHOTO_BYTES as u64 {
            log::debug!("Not reading {} ({} bytes)", path.display(), size);
            Vec::new()
        } else {
            std::fs::read(path)?
        };
        Ok(Self {
            mime: mime.to_string(),
            size,
            bytes,
        })
    }
}

fn mime_for_extension(ext: &str) -> Option<&'static str> {
    let mime = match ext {
        "jpg" | "jpeg" | "jpe" | "jfif" | "pjpeg" => "image/jpeg",
        "png" => "image/png",
        "apng" => "image/apng",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" | "dib" => "image/bmp",
        "svg" | "svgz" => "image/svg+xml",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "heic" => "image/heic",
        "heif" => "image/heif",
        "ico" | "cur" => "image/x-icon",
        "jxl" => "image/jxl",
        _ => return None,
    };
    Some(mime)
}

fn sniff_mime(head: &[u8]) -> Option<&'static str> {
    let mime = match head {
        [0xff, 0xd8, 0xff, ..] => "image/jpeg",
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        [b'B', b'M', ..] => "image/bmp",
        [b'I', b'I', 0x2a, 0x00, ..] | [b'M', b'M', 0x00, 0x2a, ..] => "image/tiff",
        [0x00, 0x00, 0x01, 0x00, ..] => "image/x-icon",
        [_, _, _, _, b'f', b't', b'y', b'p', brand @ ..] => match brand.get(..4) {
            Some(b"avif") | Some(b"avis") => "image/avif",
            Some(b"heic") | Some(b"heix") | Some(b"mif1") => "image/heic",
            _ => return None,
        },
        _ => return None,
    };
    Some(mime)
}

/// Create/edit form for a single contact.
pub struct ContactForm {
    mode: FormMode,
    state: FormState,
    fields: ContactFields,
    errors: FieldErrors,
    photo_error: Option<String>,
    drafts: Option<DraftStore>,
}

impl ContactForm {
    /// Mount a create form, restoring any saved draft.
    pub fn new(drafts: DraftStore) -> Self {
        let fields = match drafts.load() {
            Ok(Some(draft)) => {
                log::debug!("Restored form draft from {}", drafts.path().display());
                draft
            }
            Ok(None) => ContactFields::default(),
            Err(e) => {
                log::error!("Error loading saved form: {}", e);
                ContactFields::default()
            }
        };
        Self {
            mode: FormMode::Create,
            state: FormState::New,
            fields,
            errors: FieldErrors::new(),
            photo_error: None,
            drafts: Some(drafts),
        }
    }

    /// Mount an edit form for an existing contact. Drafts are not used.
    pub fn edit(contact: &Contact) -> Self {
        Self {
            mode: FormMode::Edit(contact.id),
            state: FormState::EditingExisting(contact.id),
            fields: contact.fields(),
            errors: FieldErrors::new(),
            photo_error: None,
            drafts: None,
        }
    }

    pub fn mode(&self) -> FormMode {
        self.mode
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn fields(&self) -> &ContactFields {
        &self.fields
    }

    pub fn errors(&self) -> &FieldErrors {
        &self.errors
    }

    pub fn photo_error(&self) -> Option<&str> {
        self.photo_error.as_deref()
    }

    pub fn is_submitting(&self) -> bool {
        self.state == FormState::Submitting
    }

    /// Something an image element can display: a data URL or the hosted URL.
    pub fn preview(&self) -> Option<String> {
        match &self.fields.photo {
            Photo::None => None,
            photo => Some(photo.to_wire()),
        }
    }

    /// Leave the error state once the user changes something.
    fn resume_editing(&mut self) {
        if let FormState::Error(_) = self.state {
            self.state = match self.mode {
                FormMode::Create => FormState::New,
                FormMode::Edit(id) => FormState::EditingExisting(id),
            };
        }
    }

    fn persist_draft(&self) {
        if let Some(store) = &self.drafts {
            if let Err(e) = store.save(&self.fields) {
                log::error!("Error saving form draft: {}", e);
            }
        }
    }

    pub fn set_field(&mut self, field: Field, value: impl Into<String>) {
        let value = value.into();
        match field {
            Field::Name => self.fields.name = value,
            Field::Email => self.fields.email = value,
            Field::Phone => self.fields.phone = value,
            Field::Address => self.fields.address = value,
            Field::Photo => match Photo::parse(&value) {
                Ok(photo) => self.fields.photo = photo,
                Err(e) => {
                    self.photo_error = Some(e.to_string());
                    return;
                }
            },
        }
        self.errors.remove(&field);
        self.resume_editing();
        self.persist_draft();
    }

    /// Accept an image up to 5 MiB. Rejections leave the fields untouched.
    pub fn select_photo(&mut self, file: PhotoFile) -> std::result::Result<(), String> {
        if !file.mime.starts_with("image/") {
            return Err(self.reject_photo("Please select an image file"));
        }
        if file.size > MAX_PHOTO_BYTES as u64 {
            return Err(self.reject_photo("Image size should be less than 5MB"));
        }
        self.fields.photo = Photo::Inline(InlineImage::new(file.mime, file.bytes));
        self.photo_error = None;
        self.errors.remove(&Field::Photo);
        self.resume_editing();
        self.persist_draft();
        Ok(())
    }

    fn reject_photo(&mut self, message: &str) -> String {
        self.photo_error = Some(message.to_string());
        message.to_string()
    }

    pub fn remove_photo(&mut self) {
        self.fields.photo = Photo::None;
        self.photo_error = None;
        self.resume_editing();
        self.persist_draft();
    }

    /// Run every rule, storing the per-field messages.
    pub fn validate(&mut self) -> std::result::Result<(), FieldErrors> {
        self.errors = validate_fields(&self.fields);
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self.errors.clone())
        }
    }

    /// Validate, then create or update through the repository.
    ///
    /// Field values survive a failed save.
    pub async fn submit(
        &mut self,
        repo: &mut ContactRepository,
    ) -> std::result::Result<Contact, SubmitError> {
        self.validate().map_err(SubmitError::Invalid)?;

        self.state = FormState::Submitting;
        let result = match self.mode {
            FormMode::Create => repo.create_contact(self.fields.clone()).await,
            FormMode::Edit(id) => repo.update_contact(id, self.fields.clone()).await,
        };

        match result {
            Ok(contact) => {
                if let Some(store) = &self.drafts {
                    if let Err(e) = store.clear() {
                        log::warn!("Error clearing form draft: {}", e);
                    }
                }
                self.state = FormState::Saved(contact.id);
                Ok(contact)
            }
            Err(e) => {
                log::error!("Error saving contact: {}", e);
                self.state = FormState::Error(SUBMIT_FAILED.to_string());
                Err(SubmitError::Failed(SUBMIT_FAILED.to_string()))
            }
        }
    }

    /// Leave the form. In create mode the draft is discarded.
    pub fn unmount(self) -> Result<()> {
        match (&self.mode, &self.drafts) {
            (FormMode::Create, Some(store)) => store.clear(),
            _ => Ok(()),
        }
    }
}
