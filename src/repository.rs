use chrono::{DateTime, Local};
use tokio::sync::broadcast;

use crate::config::AgendaConfig;
use crate::core::contact::{Contact, ContactFields, ContactId, Photo};
use crate::error::{Error, Result};
use crate::sync::{AgendaClient, PhotoGateway};

const AGENDA_UNAVAILABLE: &str =
    "Failed to create or access agenda. Please check your agenda slug configuration.";

const EVENT_CAPACITY: usize = 64;

/// Change notifications for whatever is rendering the contact list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
    Loaded(usize),
    Created(ContactId),
    Updated(ContactId),
    Deleted(ContactId),
    Failed(String),
}

/// Owns the contact list and every remote write that changes it.
pub struct ContactRepository {
    api: AgendaClient,
    photos: PhotoGateway,
    contacts: Vec<Contact>,
    loading: bool,
    error: Option<String>,
    last_fetched: Option<DateTime<Local>>,
    events: broadcast::Sender<RepositoryEvent>,
}

impl ContactRepository {
    pub fn new(config: &AgendaConfig) -> Result<Self> {
        let api = AgendaClient::new(&config.api_url, &config.agenda_slug)?;
        let photos = PhotoGateway::new(&config.photos)?;
        Ok(Self::with_clients(api, photos))
    }

    pub fn with_clients(api: AgendaClient, photos: PhotoGateway) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            api,
            photos,
            contacts: Vec::new(),
            loading: true,
            error: None,
            last_fetched: None,
            events,
        }
    }

    pub fn contacts(&self) -> &[Contact] {
        &self.contacts
    }

    pub fn contact(&self, id: ContactId) -> Option<&Contact> {
        self.contacts.iter().find(|c| c.id == id)
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message of the most recent failure, for passive display.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn last_fetched(&self) -> Option<DateTime<Local>> {
        self.last_fetched
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RepositoryEvent> {
        self.events.subscribe()
    }

    fn notify(&self, event: RepositoryEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn fail(&mut self, context: &str, err: Error) -> Error {
        log::error!("{} error: {}", context, err);
        let message = err.to_string();
        self.error = Some(message.clone());
        self.notify(RepositoryEvent::Failed(message));
        err
    }

    /// Make sure the agenda exists, creating it when the probe misses.
    ///
    /// A 400 or 409 from the create call means the agenda is already there.
    pub async fn ensure_agenda(&mut self) -> bool {
        match self.api.agenda_exists().await {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                self.fail("Agenda", e);
                return false;
            }
        }

        match self.api.create_agenda().await {
            Ok(()) => {
                log::info!("Created agenda {}", self.api.slug());
                true
            }
            Err(e) if matches!(e.status().map(|s| s.as_u16()), Some(400 | 409)) => {
                log::info!("Agenda {} already exists ({})", self.api.slug(), e);
                true
            }
            Err(e) => {
                self.fail("Agenda", e);
                false
            }
        }
    }

    /// Reload the whole list from the server.
    pub async fn fetch_contacts(&mut self) -> Result<()> {
        self.loading = true;
        self.error = None;

        let outcome = if self.ensure_agenda().await {
            self.api.list_contacts().await
        } else {
            Err(Error::Agenda(AGENDA_UNAVAILABLE.to_string()))
        };
        self.loading = false;

        match outcome {
            Ok(contacts) => {
                log::info!("Fetched {} contacts", contacts.len());
                let count = contacts.len();
                self.contacts = contacts;
                self.last_fetched = Some(Local::now());
                self.notify(RepositoryEvent::Loaded(count));
                Ok(())
            }
            Err(e) => {
                self.contacts.clear();
                Err(self.fail("Fetch contacts", e))
            }
        }
    }

    /// Upload an inline photo and swap in its URL. Other photos pass through.
    async fn resolve_photo(&self, photo: &Photo) -> Result<Photo> {
        match photo {
            Photo::Inline(image) => {
                log::info!("New photo detected, uploading");
                let url = self
                    .photos
                    .upload_image(image)
                    .await
                    .map_err(|e| Error::PhotoUpload(Box::new(e)))?;
                Ok(Photo::Remote(url))
            }
            other => Ok(other.clone()),
        }
    }

    pub async fn create_contact(&mut self, fields: ContactFields) -> Result<Contact> {
        let mut payload = fields;
        payload.photo = match self.resolve_photo(&payload.photo).await {
            Ok(photo) => photo,
            Err(e) => return Err(self.fail("Create", e)),
        };

        let mut created = match self.api.create_contact(&payload).await {
            Ok(c) => c,
            Err(e) => return Err(self.fail("Create", e)),
        };
        if let Photo::Remote(_) = payload.photo {
            created.photo = payload.photo;
        }

        log::info!("Contact created: {} ({})", created.name, created.id);
        self.contacts.push(created.clone());
        self.notify(RepositoryEvent::Created(created.id));
        Ok(created)
    }

    /// Replace a contact wholesale. Every field is sent; empty sent values
    /// fall back to what the server returned.
    pub async fn update_contact(&mut self, id: ContactId, fields: ContactFields) -> Result<Contact> {
        let mut payload = fields;
        payload.photo = match self.resolve_photo(&payload.photo).await {
            Ok(photo) => photo,
            Err(e) => return Err(self.fail("Update", e)),
        };

        let returned = match self.api.update_contact(id, &payload).await {
            Ok(c) => c,
            Err(e) => return Err(self.fail("Update", e)),
        };

        let updated = merge_update(payload, returned);
        log::info!("Contact updated: {} ({})", updated.name, updated.id);

        match self.contacts.iter_mut().find(|c| c.id == id) {
            Some(slot) => *slot = updated.clone(),
            None => log::debug!("Updated contact {} was not in the local list", id),
        }
        self.notify(RepositoryEvent::Updated(id));
        Ok(updated)
    }

    /// Delete a contact. Its hosted photo is removed first, best effort.
    pub async fn delete_contact(&mut self, id: ContactId) -> Result<()> {
        let photo_url = self
            .contact(id)
            .and_then(|c| c.photo.remote_url())
            .map(str::to_string);

        if let Some(url) = photo_url {
            if let Err(e) = self.photos.delete_photo(&url).await {
                log::warn!("Error deleting photo for contact {}: {}", id, e);
            }
        }

        if let Err(e) = self.api.delete_contact(id).await {
            return Err(self.fail("Delete", e));
        }

        self.contacts.retain(|c| c.id != id);
        self.notify(RepositoryEvent::Deleted(id));
        Ok(())
    }
}

fn pick(sent: String, server: String) -> String {
    if sent.is_empty() { server } else { sent }
}

fn merge_update(sent: ContactFields, server: Contact) -> Contact {
    Contact {
        id: server.id,
        name: pick(sent.name, server.name),
        email: pick(sent.email, server.email),
        phone: pick(sent.phone, server.phone),
        address: pick(sent.address, server.address),
        photo: if sent.photo.is_none() { server.photo } else { sent.photo },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhotoConfig;
    use crate::core::contact::InlineImage;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SLUG: &str = "test-book";

    fn repo(server: &MockServer) -> ContactRepository {
        let config = AgendaConfig {
            api_url: server.uri(),
            agenda_slug: SLUG.into(),
            photos: PhotoConfig {
                host: server.uri(),
                cloud_name: "demo".into(),
                upload_preset: "preset".into(),
            },
            ..AgendaConfig::default()
        };
        ContactRepository::new(&config).unwrap()
    }

    async fn agenda_exists(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("/agendas/{}", SLUG)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"slug": SLUG})))
            .mount(server)
            .await;
    }

    async fn list_returns(server: &MockServer, contacts: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path(format!("/agendas/{}/contacts", SLUG)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "contacts": contacts })))
            .mount(server)
            .await;
    }

    async fn seeded(server: &MockServer, contacts: serde_json::Value) -> ContactRepository {
        agenda_exists(server).await;
        list_returns(server, contacts).await;
        let mut repo = repo(server);
        repo.fetch_contacts().await.unwrap();
        repo
    }

    async fn agenda_create_status(status: u16, expect_create: u64) -> (bool, ContactRepository) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/agendas/{}", SLUG)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Agenda not found"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/agendas/{}", SLUG)))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({"detail": "nope"})))
            .expect(expect_create)
            .mount(&server)
            .await;
        let mut repo = repo(&server);
        let ok = repo.ensure_agenda().await;
        (ok, repo)
    }

    #[tokio::test]
    async fn ensure_agenda_existing_does_not_create() {
        let server = MockServer::start().await;
        agenda_exists(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/agendas/{}", SLUG)))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let mut repo = repo(&server);
        assert!(repo.ensure_agenda().await);
        assert!(repo.ensure_agenda().await);
        assert_eq!(repo.error(), None);
    }

    #[tokio::test]
    async fn ensure_agenda_creates_when_missing() {
        let (ok, repo) = agenda_create_status(201, 1).await;
        assert!(ok);
        assert_eq!(repo.error(), None);
    }

    #[tokio::test]
    async fn ensure_agenda_treats_conflict_as_existing() {
        for status in [400, 409] {
            let (ok, repo) = agenda_create_status(status, 1).await;
            assert!(ok, "status {} should count as existing", status);
            assert_eq!(repo.error(), None);
        }
    }

    #[tokio::test]
    async fn ensure_agenda_records_unexpected_failure() {
        let (ok, repo) = agenda_create_status(500, 1).await;
        assert!(!ok);
        assert_eq!(repo.error(), Some("Failed to create agenda: 500 nope"));
    }

    #[tokio::test]
    async fn fetch_normalizes_and_clears_loading() {
        let server = MockServer::start().await;
        let repo = seeded(
            &server,
            json!([
                {"id": 1, "name": "Ada", "email": "ada@example.com"},
                {"id": 2, "name": "Grace", "phone": "+1 (555) 123-4567", "photo": "https://img/grace.png"}
            ]),
        )
        .await;

        assert!(!repo.is_loading());
        assert!(repo.last_fetched().is_some());
        assert_eq!(repo.contacts().len(), 2);
        let ada = repo.contact(ContactId(1)).unwrap();
        assert_eq!(ada.phone, "");
        assert_eq!(ada.address, "");
        assert_eq!(ada.photo, Photo::None);
        let grace = repo.contact(ContactId(2)).unwrap();
        assert_eq!(grace.photo, Photo::Remote("https://img/grace.png".into()));
    }

    #[tokio::test]
    async fn fetch_failure_empties_list_and_records_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/agendas/{}", SLUG)))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/agendas/{}", SLUG)))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut repo = repo(&server);
        assert!(repo.is_loading());
        let err = repo.fetch_contacts().await.unwrap_err();
        assert!(matches!(err, Error::Agenda(_)));
        assert!(!repo.is_loading());
        assert!(repo.contacts().is_empty());
        assert_eq!(repo.error(), Some(AGENDA_UNAVAILABLE));
    }

    #[tokio::test]
    async fn create_with_inline_photo_uploads_first() {
        let server = MockServer::start().await;
        let mut repo = seeded(&server, json!([])).await;
        let url = "https://res.cloudinary.com/demo/image/upload/v1/face.jpg";

        Mock::given(method("POST"))
            .and(path("/v1_1/demo/image/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"secure_url": url})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/agendas/{}/contacts", SLUG)))
            .and(body_json(json!({
                "name": "Ada", "email": "ada@example.com", "phone": "", "address": "", "photo": url
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 11, "name": "Ada", "email": "ada@example.com", "phone": null, "address": null, "photo": url
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut events = repo.subscribe();
        let fields = ContactFields {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            photo: Photo::Inline(InlineImage::new("image/png", vec![1, 2, 3])),
            ..ContactFields::default()
        };
        let created = repo.create_contact(fields).await.unwrap();

        assert_eq!(created.id, ContactId(11));
        assert_eq!(created.photo, Photo::Remote(url.into()));
        assert_eq!(repo.contacts(), &[created.clone()]);
        assert_eq!(events.recv().await.unwrap(), RepositoryEvent::Created(ContactId(11)));
    }

    #[tokio::test]
    async fn create_then_fetch_shows_record() {
        let server = MockServer::start().await;
        agenda_exists(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/agendas/{}/contacts", SLUG)))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                "id": 3, "name": "Linus", "email": "", "phone": "0123456789", "address": "Helsinki", "photo": ""
            })))
            .mount(&server)
            .await;
        list_returns(
            &server,
            json!([{"id": 3, "name": "Linus", "phone": "0123456789", "address": "Helsinki"}]),
        )
        .await;

        let mut repo = repo(&server);
        let fields = ContactFields {
            name: "Linus".into(),
            phone: "0123456789".into(),
            address: "Helsinki".into(),
            ..ContactFields::default()
        };
        repo.create_contact(fields.clone()).await.unwrap();
        repo.fetch_contacts().await.unwrap();

        let fetched = repo.contact(ContactId(3)).unwrap();
        assert_eq!(fetched.fields(), fields);
    }

    #[tokio::test]
    async fn photo_upload_failure_aborts_create() {
        let server = MockServer::start().await;
        let mut repo = seeded(&server, json!([])).await;

        Mock::given(method("POST"))
            .and(path("/v1_1/demo/image/upload"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"error": {"message": "boom"}})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/agendas/{}/contacts", SLUG)))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let fields = ContactFields {
            name: "Ada".into(),
            photo: Photo::Inline(InlineImage::new("image/jpeg", vec![9])),
            ..ContactFields::default()
        };
        let err = repo.create_contact(fields).await.unwrap_err();
        assert!(matches!(err, Error::PhotoUpload(_)));
        assert!(repo.contacts().is_empty());
        assert!(repo.error().unwrap().starts_with("Failed to upload contact photo"));
    }

    #[tokio::test]
    async fn create_rejection_embeds_status_and_detail() {
        let server = MockServer::start().await;
        let mut repo = seeded(&server, json!([])).await;
        Mock::given(method("POST"))
            .and(path(format!("/agendas/{}/contacts", SLUG)))
            .respond_with(ResponseTemplate::new(422).set_body_json(json!({"detail": "name is required"})))
            .mount(&server)
            .await;

        let err = repo.create_contact(ContactFields::new("x")).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to create contact: 422 name is required");
        assert_eq!(repo.error(), Some("Failed to create contact: 422 name is required"));
    }

    #[tokio::test]
    async fn update_replaces_whole_record_without_reupload() {
        let server = MockServer::start().await;
        let photo = "https://res.cloudinary.com/demo/image/upload/v1/old.jpg";
        let mut repo = seeded(
            &server,
            json!([
                {"id": 4, "name": "Old", "email": "old@example.com", "phone": "0123456789", "address": "Old St", "photo": photo},
                {"id": 5, "name": "Other"}
            ]),
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/v1_1/demo/image/upload"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path(format!("/agendas/{}/contacts/4", SLUG)))
            .and(body_json(json!({
                "name": "New", "email": "new@example.com", "phone": "+1 (555) 123-4567", "address": "New Ave", "photo": photo
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 4, "name": "New", "email": "new@example.com", "phone": "+1 (555) 123-4567", "address": "New Ave", "photo": photo
            })))
            .expect(1)
            .mount(&server)
            .await;

        let fields = ContactFields {
            name: "New".into(),
            email: "new@example.com".into(),
            phone: "+1 (555) 123-4567".into(),
            address: "New Ave".into(),
            photo: Photo::Remote(photo.into()),
        };
        let updated = repo.update_contact(ContactId(4), fields.clone()).await.unwrap();

        assert_eq!(updated.fields(), fields);
        assert_eq!(repo.contact(ContactId(4)).unwrap().fields(), fields);
        assert_eq!(repo.contact(ContactId(5)).unwrap().name, "Other");
    }

    #[tokio::test]
    async fn update_falls_back_to_server_values_for_empty_fields() {
        let server = MockServer::start().await;
        let mut repo = seeded(&server, json!([{"id": 6, "name": "Kay"}])).await;
        Mock::given(method("PUT"))
            .and(path(format!("/agendas/{}/contacts/6", SLUG)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 6, "name": "Kay", "email": "kay@server.example", "phone": "", "address": "", "photo": ""
            })))
            .mount(&server)
            .await;

        let updated = repo.update_contact(ContactId(6), ContactFields::new("Kay")).await.unwrap();
        assert_eq!(updated.email, "kay@server.example");
        assert_eq!(updated.phone, "");
    }

    #[tokio::test]
    async fn update_rejection_keeps_local_record() {
        let server = MockServer::start().await;
        let mut repo = seeded(&server, json!([{"id": 7, "name": "Ken"}])).await;
        Mock::given(method("PUT"))
            .and(path(format!("/agendas/{}/contacts/7", SLUG)))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"detail": "Contact not found"})))
            .mount(&server)
            .await;

        let err = repo.update_contact(ContactId(7), ContactFields::new("Dennis")).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to update contact: 404 Contact not found");
        assert_eq!(repo.contact(ContactId(7)).unwrap().name, "Ken");
    }

    #[tokio::test]
    async fn delete_survives_photo_cleanup_failure() {
        let server = MockServer::start().await;
        let mut repo = seeded(
            &server,
            json!([
                {"id": 8, "name": "Barbara", "photo": "https://res.cloudinary.com/demo/image/upload/v1/barbara.jpg"},
                {"id": 9, "name": "Frances"}
            ]),
        )
        .await;

        Mock::given(method("POST"))
            .and(path("/v1_1/demo/image/destroy"))
            .and(body_json(json!({"public_id": "barbara"})))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(format!("/agendas/{}/contacts/8", SLUG)))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let mut events = repo.subscribe();
        repo.delete_contact(ContactId(8)).await.unwrap();
        assert_eq!(repo.contacts().len(), 1);
        assert!(repo.contact(ContactId(8)).is_none());
        assert_eq!(events.recv().await.unwrap(), RepositoryEvent::Deleted(ContactId(8)));
    }

    #[tokio::test]
    async fn delete_failure_keeps_record() {
        let server = MockServer::start().await;
        let mut repo = seeded(&server, json!([{"id": 10, "name": "Edsger"}])).await;
        Mock::given(method("DELETE"))
            .and(path(format!("/agendas/{}/contacts/10", SLUG)))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({"detail": "db down"})))
            .mount(&server)
            .await;

        let err = repo.delete_contact(ContactId(10)).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to delete contact: 500 db down");
        assert_eq!(repo.contacts().len(), 1);
        assert_eq!(repo.error(), Some("Failed to delete contact: 500 db down"));
    }

    #[test]
    fn merge_update_prefers_sent_values() {
        let server = Contact {
            id: ContactId(1),
            name: "Server".into(),
            email: "s@example.com".into(),
            phone: String::new(),
            address: "Server Rd".into(),
            photo: Photo::Remote("https://img/s.png".into()),
        };
        let sent = ContactFields {
            name: "Sent".into(),
            address: String::new(),
            ..ContactFields::default()
        };
        let merged = merge_update(sent, server);
        assert_eq!(merged.name, "Sent");
        assert_eq!(merged.email, "s@example.com");
        assert_eq!(merged.address, "Server Rd");
        assert_eq!(merged.photo, Photo::Remote("https://img/s.png".into()));
    }
}
