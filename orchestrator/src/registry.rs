//! Read applications and blockchains from the document store.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::{future::Future, path::PathBuf};
use warden_relay::{Application, Blockchain};

/// Source of the applications to check and of the chains they use.
///
/// Collections are returned in store order.
pub trait Registry: Clone + Send + Sync + 'static {
    fn staked_applications(&self) -> impl Future<Output = Result<Vec<Application>, Error>> + Send;

    fn gigastaked_applications(
        &self,
    ) -> impl Future<Output = Result<Vec<Application>, Error>> + Send;

    fn settlers_applications(
        &self,
    ) -> impl Future<Output = Result<Vec<Application>, Error>> + Send;

    fn blockchains(&self) -> impl Future<Output = Result<Vec<Blockchain>, Error>> + Send;
}

/// Contents of the document store.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Document {
    pub staked: Vec<Application>,
    pub gigastaked: Vec<Application>,
    pub settlers: Vec<Application>,
    pub blockchains: Vec<Blockchain>,
}

/// A [Registry] serving a fixed [Document].
#[derive(Clone, Debug, Default)]
pub struct Static {
    document: Document,
}

impl Static {
    pub fn new(document: Document) -> Self {
        Self { document }
    }
}

impl Registry for Static {
    async fn staked_applications(&self) -> Result<Vec<Application>, Error> {
        Ok(self.document.staked.clone())
    }

    async fn gigastaked_applications(&self) -> Result<Vec<Application>, Error> {
        Ok(self.document.gigastaked.clone())
    }

    async fn settlers_applications(&self) -> Result<Vec<Application>, Error> {
        Ok(self.document.settlers.clone())
    }

    async fn blockchains(&self) -> Result<Vec<Blockchain>, Error> {
        Ok(self.document.blockchains.clone())
    }
}

/// A [Registry] backed by a YAML [Document] on disk.
///
/// The file is read on every call, so it can be updated between runs.
#[derive(Clone, Debug)]
pub struct File {
    path: PathBuf,
}

impl File {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<Document, Error> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|err| {
            Error::Registry(format!("failed to read {}: {err}", self.path.display()))
        })?;
        serde_yaml::from_str(&contents).map_err(|err| {
            Error::Registry(format!("failed to parse {}: {err}", self.path.display()))
        })
    }
}

impl Registry for File {
    async fn staked_applications(&self) -> Result<Vec<Application>, Error> {
        Ok(self.read().await?.staked)
    }

    async fn gigastaked_applications(&self) -> Result<Vec<Application>, Error> {
        Ok(self.read().await?.gigastaked)
    }

    async fn settlers_applications(&self) -> Result<Vec<Application>, Error> {
        Ok(self.read().await?.settlers)
    }

    async fn blockchains(&self) -> Result<Vec<Blockchain>, Error> {
        Ok(self.read().await?.blockchains)
    }
}
