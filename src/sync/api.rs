use reqwest::{Client, Response};
use serde::Deserialize;

use crate::core::contact::{Contact, ContactFields, ContactId, RemoteContact};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct ContactList {
    #[serde(default)]
    contacts: Option<Vec<RemoteContact>>,
}

/// Client for the agenda-scoped contact REST API.
pub struct AgendaClient {
    base_url: String,
    slug: String,
    http: Client,
}

impl AgendaClient {
    pub fn new(base_url: &str, slug: &str) -> Result<Self> {
        if slug.trim().is_empty() {
            return Err(Error::Config("agenda slug is empty".into()));
        }
        let http = Client::builder().build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            slug: slug.to_string(),
            http,
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    fn agenda_url(&self) -> String {
        format!("{}/agendas/{}", self.base_url, self.slug)
    }

    fn contacts_url(&self) -> String {
        format!("{}/contacts", self.agenda_url())
    }

    fn contact_url(&self, id: ContactId) -> String {
        format!("{}/{}", self.contacts_url(), id)
    }

    /// Probe for the agenda. Any non-success status reads as "absent".
    pub async fn agenda_exists(&self) -> Result<bool> {
        let url = self.agenda_url();
        log::debug!("GET {}", url);
        let resp = self.http.get(&url).send().await?;
        log::info!("Agenda probe {} returned {}", self.slug, resp.status());
        Ok(resp.status().is_success())
    }

    pub async fn create_agenda(&self) -> Result<()> {
        let url = self.agenda_url();
        log::info!("Creating agenda {}", self.slug);
        let resp = self
            .http
            .post(&url)
            .header("Content-Type", "application/json")
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(rejection("Failed to create agenda", resp).await)
        }
    }

    pub async fn list_contacts(&self) -> Result<Vec<Contact>> {
        let url = self.contacts_url();
        log::debug!("GET {}", url);
        let resp = self.http.get(&url).send().await?;
        if !resp.status().is_success() {
            return Err(rejection("Failed to fetch contacts", resp).await);
        }
        let text = resp.text().await?;
        let list: ContactList = serde_json::from_str(&text)?;
        Ok(list
            .contacts
            .unwrap_or_default()
            .into_iter()
            .map(RemoteContact::normalize)
            .collect())
    }

    pub async fn create_contact(&self, fields: &ContactFields) -> Result<Contact> {
        let url = self.contacts_url();
        log::debug!("POST {} {:?}", url, fields.name);
        let resp = self.http.post(&url).json(fields).send().await?;
        if !resp.status().is_success() {
            return Err(rejection("Failed to create contact", resp).await);
        }
        parse_contact(resp).await
    }

    pub async fn update_contact(&self, id: ContactId, fields: &ContactFields) -> Result<Contact> {
        let url = self.contact_url(id);
        log::debug!("PUT {}", url);
        let resp = self.http.put(&url).json(fields).send().await?;
        if !resp.status().is_success() {
            return Err(rejection("Failed to update contact", resp).await);
        }
        parse_contact(resp).await
    }

    pub async fn delete_contact(&self, id: ContactId) -> Result<()> {
        let url = self.contact_url(id);
        log::info!("Deleting contact {}", id);
        let resp = self.http.delete(&url).send().await?;
        log::debug!("DELETE {} status: {}", url, resp.status());
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(rejection("Failed to delete contact", resp).await)
        }
    }
}

async fn parse_contact(resp: Response) -> Result<Contact> {
    let text = resp.text().await?;
    let raw: RemoteContact = serde_json::from_str(&text)?;
    Ok(raw.normalize())
}

/// Build a rejection from the status and the body's `detail` field.
pub(crate) async fn rejection(action: &str, resp: Response) -> Error {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_default();
    log::warn!("{} ({}): {}", action, status, text);
    Error::rejected(action, status, extract_detail(&text))
}

fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
