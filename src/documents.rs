// SPDX-FileCopyrightText: 2024 Noah Fontes
//
// SPDX-License-Identifier: Apache-2.0

//! The document routes of the DocHub API, which all require a session token.

use std::path::PathBuf;

use log::debug;
use reqwest::{
    multipart::{Form, Part},
    RequestBuilder, StatusCode,
};
use secrecy::{ExposeSecret as _, SecretString};
use serde::{de::DeserializeOwned, Deserialize};
use tabled::Tabled;

use crate::{error, http};

fn format_option(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[derive(Clone, Debug, Deserialize, Tabled)]
pub(crate) struct Document {
    #[tabled(rename = "ID")]
    pub(crate) id: u64,
    #[tabled(rename = "Title", display_with = "format_option")]
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[tabled(rename = "File")]
    pub(crate) original_filename: String,
    #[tabled(rename = "Type", display_with = "format_option")]
    #[serde(default)]
    pub(crate) document_type: Option<String>,
    #[tabled(rename = "Department", display_with = "format_option")]
    #[serde(default)]
    pub(crate) department: Option<String>,
    #[tabled(rename = "Priority", display_with = "format_option")]
    #[serde(default)]
    pub(crate) priority: Option<String>,
    #[tabled(rename = "Status")]
    pub(crate) processing_status: String,
    #[tabled(rename = "Language")]
    pub(crate) language: String,
    #[tabled(rename = "Size")]
    pub(crate) file_size: u64,
    #[tabled(skip)]
    pub(crate) filename: String,
    #[tabled(skip)]
    pub(crate) mime_type: String,
    #[tabled(skip)]
    pub(crate) uploaded_by: u64,
    #[tabled(rename = "Uploaded")]
    pub(crate) created_at: String,
}

#[derive(Clone, Debug, Deserialize)]
pub(crate) struct Summary {
    pub(crate) id: u64,
    pub(crate) document_id: u64,
    pub(crate) summary_text: String,
    pub(crate) summary_type: String,
    pub(crate) language: String,
    #[serde(default)]
    pub(crate) confidence_score: Option<f64>,
    pub(crate) created_at: String,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Upload {
    pub(crate) path: PathBuf,
    pub(crate) title: Option<String>,
    pub(crate) document_type: Option<String>,
    pub(crate) department: Option<String>,
}

pub(crate) struct Client {
    endpoint: http::Endpoint,
}

impl Client {
    pub(crate) const fn new(endpoint: http::Endpoint) -> Self {
        Self { endpoint }
    }

    async fn send<T: DeserializeOwned>(
        request: RequestBuilder,
        token: &SecretString,
    ) -> Result<T, error::Document> {
        let response = request.bearer_auth(token.expose_secret()).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(error::Document::TokenRejected);
        }
        if !status.is_success() {
            debug!(
                "Document request failed with {}: {}",
                status,
                response.text().await.unwrap_or_default()
            );
            return Err(error::Document::Status(status));
        }
        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    pub(crate) async fn list(&self, token: &SecretString) -> Result<Vec<Document>, error::Document> {
        let url = self.endpoint.url("documents/")?;
        Self::send(self.endpoint.client().get(url), token).await
    }

    pub(crate) async fn show(
        &self,
        token: &SecretString,
        id: u64,
    ) -> Result<Document, error::Document> {
        let url = self.endpoint.url(&format!("documents/{id}"))?;
        Self::send(self.endpoint.client().get(url), token).await
    }

    pub(crate) async fn summarize(
        &self,
        token: &SecretString,
        id: u64,
    ) -> Result<Summary, error::Document> {
        let url = self.endpoint.url(&format!("documents/{id}/summarize"))?;
        Self::send(self.endpoint.client().post(url), token).await
    }

    pub(crate) async fn upload(
        &self,
        token: &SecretString,
        upload: Upload,
    ) -> Result<Document, error::Document> {
        let url = self.endpoint.url("documents/upload")?;
        let data = tokio::fs::read(&upload.path).await?;
        let file_name = upload
            .path
            .file_name()
            .map_or_else(|| "upload".to_owned(), |name| name.to_string_lossy().into_owned());
        debug!("Uploading {} ({} bytes)", file_name, data.len());

        let mut form = Form::new().part("file", Part::bytes(data).file_name(file_name));
        for (name, value) in [
            ("title", upload.title),
            ("document_type", upload.document_type),
            ("department", upload.department),
        ] {
            if let Some(value) = value {
                form = form.text(name, value);
            }
        }

        Self::send(self.endpoint.client().post(url).multipart(form), token).await
    }
}
