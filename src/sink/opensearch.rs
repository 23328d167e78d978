//! OpenSearch-backed sink speaking the document REST API.
//!
//! Creating and updating both `PUT` the full document under its ID, which the
//! index treats as an upsert. Deleting a document that is already gone answers
//! `404`, which is reported as success.

use std::{marker::PhantomData, time::Duration};

use futures_util::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Document, SearchSink};
use crate::error::{Error, Result};

pub struct OpenSearchSink<D> {
    client: Client,
    base_url: Url,
    index: String,
    username: Option<String>,
    password: Option<SecretString>,
    _doc: PhantomData<fn() -> D>,
}

#[bon::bon]
impl<D: Document> OpenSearchSink<D> {
    #[builder]
    pub fn new(
        base_url: Url,
        #[builder(into)] index: String,
        #[builder(into)] username: Option<String>,
        password: Option<SecretString>,
        #[builder(default = Duration::from_secs(30))] timeout: Duration,
    ) -> Result<Self> {
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl {
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            });
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url,
            index,
            username,
            password,
            _doc: PhantomData,
        })
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    /// `{base}/{index}/_doc/{id}`, with each segment percent-encoded.
    pub fn document_url(&self, id: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl {
                source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
            })?
            .pop_if_empty()
            .push(&self.index)
            .push("_doc")
            .push(id);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match &self.username {
            Some(username) => request.basic_auth(
                username,
                self.password.as_ref().map(|p| p.expose_secret().to_owned()),
            ),
            None => request,
        }
    }

    async fn put_document(&self, operation: &'static str, doc: &D) -> Result<()> {
        let id = doc.document_id();
        let response = self
            .request(Method::PUT, self.document_url(id)?)
            .json(doc)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::SearchStatus {
                operation,
                id: id.to_owned(),
                status: status.as_u16(),
            });
        }

        tracing::debug!(index = %self.index, document_id = %id, operation, "Indexed document");
        Ok(())
    }
}

impl<D: Document> SearchSink for OpenSearchSink<D> {
    type Document = D;

    fn create<'a>(&'a self, doc: &'a D) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.put_document("create", doc))
    }

    fn update<'a>(&'a self, doc: &'a D) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.put_document("update", doc))
    }

    fn delete<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let response = self
                .request(Method::DELETE, self.document_url(id)?)
                .send()
                .await?;

            let status = response.status();
            if status == StatusCode::NOT_FOUND {
                tracing::debug!(index = %self.index, document_id = %id, "Document already absent");
                return Ok(());
            }
            if !status.is_success() {
                return Err(Error::SearchStatus {
                    operation: "delete",
                    id: id.to_owned(),
                    status: status.as_u16(),
                });
            }

            Ok(())
        })
    }
}
