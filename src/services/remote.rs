// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote run API client.

use crate::error::NetworkError;
use crate::models::{CreateRunRequest, Run, RunDto};
use crate::services::auth::{check_status, AuthedHttpClient};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Method;
use std::sync::Arc;

const RUN_DATA_PART: &str = "RUN_DATA";
const MAP_PICTURE_PART: &str = "MAP_PICTURE";
const MAP_PICTURE_FILE_NAME: &str = "mappicture.jpg";

/// The backend's run endpoints.
#[async_trait]
pub trait RemoteRunDataSource: Send + Sync {
    /// All runs of the signed-in user.
    async fn get_runs(&self) -> Result<Vec<Run>, NetworkError>;

    /// Upload a run (which must already have an ID) with its map snapshot.
    /// Returns the server's copy, including the map URL.
    async fn post_run(&self, run: &Run, map_picture: &[u8]) -> Result<Run, NetworkError>;

    async fn delete_run(&self, id: &str) -> Result<(), NetworkError>;

    /// End the session on the server.
    async fn logout(&self) -> Result<(), NetworkError>;
}

/// [`RemoteRunDataSource`] over HTTP.
pub struct HttpRunDataSource {
    client: Arc<AuthedHttpClient>,
}

impl HttpRunDataSource {
    pub fn new(client: Arc<AuthedHttpClient>) -> Self {
        Self { client }
    }
}

fn run_from_dto(dto: RunDto) -> Result<Run, NetworkError> {
    let id = dto.id.clone();
    Run::try_from(dto).map_err(|e| {
        tracing::warn!(run_id = %id, error = %e, "Bad date in remote run");
        NetworkError::Serialization
    })
}

#[async_trait]
impl RemoteRunDataSource for HttpRunDataSource {
    async fn get_runs(&self) -> Result<Vec<Run>, NetworkError> {
        let response = self
            .client
            .send_authed(|c| Ok(c.request(Method::GET, "/runs")))
            .await?;
        let dtos: Vec<RunDto> = check_status(response)?
            .json()
            .await
            .map_err(|e| NetworkError::from_transport(&e))?;

        dtos.into_iter().map(run_from_dto).collect()
    }

    async fn post_run(&self, run: &Run, map_picture: &[u8]) -> Result<Run, NetworkError> {
        let request = CreateRunRequest::from_run(run).ok_or_else(|| {
            tracing::error!("Tried to upload a run without an ID");
            NetworkError::Serialization
        })?;
        let run_data = serde_json::to_string(&request).map_err(|_| NetworkError::Serialization)?;

        let response = self
            .client
            .send_authed(|c| {
                let run_part = Part::text(run_data.clone())
                    .mime_str("application/json")
                    .map_err(|_| NetworkError::Serialization)?;
                let picture_part = Part::bytes(map_picture.to_vec())
                    .file_name(MAP_PICTURE_FILE_NAME)
                    .mime_str("image/jpeg")
                    .map_err(|_| NetworkError::Serialization)?;
                let form = Form::new()
                    .part(RUN_DATA_PART, run_part)
                    .part(MAP_PICTURE_PART, picture_part);
                Ok(c.request(Method::POST, "/run").multipart(form))
            })
            .await?;

        let dto: RunDto = check_status(response)?
            .json()
            .await
            .map_err(|e| NetworkError::from_transport(&e))?;
        tracing::info!(run_id = %dto.id, "Run uploaded");
        run_from_dto(dto)
    }

    async fn delete_run(&self, id: &str) -> Result<(), NetworkError> {
        let response = self
            .client
            .send_authed(|c| Ok(c.request(Method::DELETE, "/run").query(&[("id", id)])))
            .await?;
        check_status(response)?;
        tracing::info!(run_id = %id, "Run deleted remotely");
        Ok(())
    }

    async fn logout(&self) -> Result<(), NetworkError> {
        let response = self
            .client
            .send_authed(|c| Ok(c.request(Method::GET, "/logout")))
            .await?;
        check_status(response)?;
        Ok(())
    }
}
