//! This module provides a client to connect to the upstream contacts API
//!
//! Transport and authentication only: every response body is a JSON envelope
//! carrying a Proton-style `Code`, checked here so the rest of the crate never
//! sees half-failed responses.

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};

use crate::contact::{
    Contact, ContactExport, ContactId, ContactImport, ContactResponse, DeleteResponse,
    CODE_SUCCESS,
};
use crate::error::ApiError;
use crate::resource::Resource;
use crate::traits::ContactsApi;

/// A [`ContactsApi`] implementation backed by the real upstream HTTP API
pub struct Client {
    http: reqwest::Client,
    resource: Resource,
}

impl Client {
    /// Create a client. This does not start a connection
    pub fn new(resource: Resource) -> Self {
        Self {
            http: reqwest::Client::new(),
            resource,
        }
    }

    async fn send<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, ApiError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = self.resource.route(path)?;
        log::debug!("{} {}", method, url.path());

        let mut request = self
            .http
            .request(method, url.as_str())
            .header("x-pm-uid", self.resource.session_uid())
            .bearer_auth(self.resource.access_token());
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("unexpected HTTP status code {}", status).into());
        }
        Ok(response.json::<T>().await?)
    }
}

fn check_code(code: u32, error: Option<String>) -> Result<(), ApiError> {
    if code == CODE_SUCCESS {
        return Ok(());
    }
    Err(match error {
        Some(msg) => format!("API error {}: {}", code, msg).into(),
        None => format!("API error {}", code).into(),
    })
}

#[derive(Deserialize)]
struct GetContactResp {
    #[serde(rename = "Code")]
    code: u32,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Contact")]
    contact: Option<Contact>,
}

#[derive(Deserialize)]
struct ListContactsResp {
    #[serde(rename = "Code")]
    code: u32,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Total", default)]
    total: usize,
    #[serde(rename = "Contacts", default)]
    contacts: Vec<Contact>,
}

#[derive(Deserialize)]
struct ListContactsExportResp {
    #[serde(rename = "Code")]
    code: u32,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Total", default)]
    total: usize,
    #[serde(rename = "Contacts", default)]
    contacts: Vec<ContactExport>,
}

#[derive(Serialize)]
struct CreateContactsReq {
    #[serde(rename = "Contacts")]
    contacts: Vec<ContactImport>,
    #[serde(rename = "Overwrite")]
    overwrite: u8,
    #[serde(rename = "Groups")]
    groups: u8,
    #[serde(rename = "Labels")]
    labels: u8,
}

#[derive(Deserialize)]
struct CreateContactsResp {
    #[serde(rename = "Code")]
    code: u32,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Responses", default)]
    responses: Vec<IndexedContactResp>,
}

#[derive(Deserialize)]
struct IndexedContactResp {
    #[serde(rename = "Response")]
    response: ContactResponse,
}

#[derive(Deserialize)]
struct UpdateContactResp {
    #[serde(rename = "Code")]
    code: u32,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Contact")]
    contact: Option<Contact>,
}

#[derive(Deserialize)]
struct DeleteContactsResp {
    #[serde(rename = "Code")]
    code: u32,
    #[serde(rename = "Error", default)]
    error: Option<String>,
    #[serde(rename = "Responses", default)]
    responses: Vec<IndexedDeleteResp>,
}

#[derive(Deserialize)]
struct IndexedDeleteResp {
    #[serde(rename = "Response")]
    response: DeleteResponse,
}

#[async_trait]
impl ContactsApi for Client {
    async fn get_contact(&self, id: &ContactId) -> Result<Contact, ApiError> {
        let resp: GetContactResp = self
            .send(Method::GET, &format!("contacts/{}", id), None)
            .await?;
        check_code(resp.code, resp.error)?;
        resp.contact
            .ok_or_else(|| format!("no contact in response for {}", id).into())
    }

    async fn list_contacts(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(usize, Vec<Contact>), ApiError> {
        let resp: ListContactsResp = self
            .send(
                Method::GET,
                &format!("contacts?Page={}&PageSize={}", page, page_size),
                None,
            )
            .await?;
        check_code(resp.code, resp.error)?;
        Ok((resp.total, resp.contacts))
    }

    async fn list_contacts_export(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<(usize, Vec<ContactExport>), ApiError> {
        let resp: ListContactsExportResp = self
            .send(
                Method::GET,
                &format!("contacts/export?Page={}&PageSize={}", page, page_size),
                None,
            )
            .await?;
        check_code(resp.code, resp.error)?;
        Ok((resp.total, resp.contacts))
    }

    async fn create_contacts(
        &self,
        imports: Vec<ContactImport>,
    ) -> Result<Vec<ContactResponse>, ApiError> {
        let body = serde_json::to_value(CreateContactsReq {
            contacts: imports,
            overwrite: 0,
            groups: 0,
            labels: 0,
        })?;
        let resp: CreateContactsResp = self.send(Method::POST, "contacts", Some(body)).await?;
        check_code(resp.code, resp.error)?;
        Ok(resp.responses.into_iter().map(|r| r.response).collect())
    }

    async fn update_contact(
        &self,
        id: &ContactId,
        import: &ContactImport,
    ) -> Result<Contact, ApiError> {
        let body = serde_json::to_value(import)?;
        let resp: UpdateContactResp = self
            .send(Method::PUT, &format!("contacts/{}", id), Some(body))
            .await?;
        check_code(resp.code, resp.error)?;
        resp.contact
            .ok_or_else(|| format!("no contact in response for {}", id).into())
    }

    async fn delete_contacts(&self, ids: &[ContactId]) -> Result<Vec<DeleteResponse>, ApiError> {
        let body = serde_json::json!({ "IDs": ids });
        let resp: DeleteContactsResp = self
            .send(Method::PUT, "contacts/delete", Some(body))
            .await?;
        check_code(resp.code, resp.error)?;
        Ok(resp.responses.into_iter().map(|r| r.response).collect())
    }
}
