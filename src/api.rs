/*!
 * Remote session API
 *
 * [`UploadApi`] is the seam between the multipart pipeline and the service.
 * [`HttpUploadApi`] speaks the Upload API wire format over [`Transport`];
 * tests substitute in-memory implementations.
 */

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG};
use reqwest::multipart::Form;
use reqwest::{Body, Response};
use serde::de::DeserializeOwned;
use tracing::debug;
use upflow_core_resilience::{cancellable, CancellationToken};
use url::Url;

use crate::config::UploadSettings;
use crate::error::{Result, UploadError};
use crate::progress::{ProgressInfo, ProgressSink};
use crate::transport::Transport;
use crate::types::{ErrorEnvelope, FileInfo, MultipartStartRequest, MultipartStartResponse, PartAck};

/// Bytes handed to the HTTP stack per progress tick
const PROGRESS_SLICE: usize = 64 * 1024;

/// Calls consumed by the multipart session
#[async_trait]
pub trait UploadApi: Send + Sync {
    /// Open a session and obtain one upload target per part
    async fn multipart_start(
        &self,
        request: &MultipartStartRequest,
        cancel: &CancellationToken,
    ) -> Result<MultipartStartResponse>;

    /// Upload one part's bytes to its target
    async fn multipart_upload_part(
        &self,
        url: &str,
        index: usize,
        data: Bytes,
        on_progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PartAck>;

    /// Close the session once every part is uploaded
    async fn multipart_complete(&self, uuid: &str, cancel: &CancellationToken) -> Result<FileInfo>;

    /// Fetch the current file descriptor
    async fn info(&self, uuid: &str, cancel: &CancellationToken) -> Result<FileInfo>;
}

/// [`UploadApi`] over HTTP
#[derive(Debug, Clone)]
pub struct HttpUploadApi {
    transport: Transport,
    base_url: String,
    source: String,
}

impl HttpUploadApi {
    pub fn new(settings: &UploadSettings) -> Result<Self> {
        Self::with_transport(Transport::new(settings)?, settings)
    }

    pub fn with_transport(transport: Transport, settings: &UploadSettings) -> Result<Self> {
        let base_url = settings.base_url.trim_end_matches('/').to_string();
        Url::parse(&base_url)?;

        Ok(Self {
            transport,
            base_url,
            source: settings.source.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url, path))?;
        url.query_pairs_mut().append_pair("jsonerrors", "1");
        Ok(url)
    }

    fn start_form(&self, request: &MultipartStartRequest) -> Form {
        let mut form = Form::new()
            .text("UPLOADCARE_PUB_KEY", self.transport.public_key().to_string())
            .text("filename", request.file_name.clone())
            .text("size", request.size.to_string())
            .text("content_type", request.content_type.clone())
            .text("UPLOADCARE_STORE", request.store.as_form_value())
            .text("source", self.source.clone());

        if let Some(signature) = &request.secure_signature {
            form = form.text("signature", signature.clone());
        }
        if let Some(expire) = &request.secure_expire {
            form = form.text("expire", expire.clone());
        }
        for (key, value) in &request.metadata {
            form = form.text(format!("metadata[{}]", key), value.clone());
        }
        form
    }
}

#[async_trait]
impl UploadApi for HttpUploadApi {
    async fn multipart_start(
        &self,
        request: &MultipartStartRequest,
        cancel: &CancellationToken,
    ) -> Result<MultipartStartResponse> {
        let url = self.endpoint("multipart/start/")?;
        let response = self
            .transport
            .send(|http| http.post(url.clone()).multipart(self.start_form(request)), cancel)
            .await?;
        read_json(response, cancel).await
    }

    async fn multipart_upload_part(
        &self,
        url: &str,
        index: usize,
        data: Bytes,
        on_progress: ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<PartAck> {
        let target = Url::parse(url)?;
        let len = data.len();

        let response = self
            .transport
            .send_presigned(
                |http| {
                    http.put(target.clone())
                        .header(CONTENT_TYPE, "application/octet-stream")
                        .header(CONTENT_LENGTH, len.to_string())
                        .body(progress_body(data.clone(), on_progress.clone()))
                },
                cancel,
            )
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = cancellable(cancel, response.text()).await??;
            return Err(UploadError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        on_progress(ProgressInfo::Computable { value: 1.0 });
        debug!(part = index, status = status.as_u16(), "part accepted");

        Ok(PartAck {
            index,
            status: status.as_u16(),
            etag,
        })
    }

    async fn multipart_complete(&self, uuid: &str, cancel: &CancellationToken) -> Result<FileInfo> {
        let url = self.endpoint("multipart/complete/")?;
        let public_key = self.transport.public_key();
        let response = self
            .transport
            .send(
                |http| {
                    let form = Form::new()
                        .text("UPLOADCARE_PUB_KEY", public_key.to_string())
                        .text("uuid", uuid.to_string());
                    http.post(url.clone()).multipart(form)
                },
                cancel,
            )
            .await?;
        read_json(response, cancel).await
    }

    async fn info(&self, uuid: &str, cancel: &CancellationToken) -> Result<FileInfo> {
        let mut url = self.endpoint("info/")?;
        url.query_pairs_mut()
            .append_pair("pub_key", self.transport.public_key())
            .append_pair("file_id", uuid);

        let response = self.transport.send(|http| http.get(url.clone()), cancel).await?;
        read_json(response, cancel).await
    }
}

/// Body that reports upload progress as slices are handed to the connection
fn progress_body(data: Bytes, on_progress: ProgressSink) -> Body {
    Body::wrap_stream(stream::iter(progress_slices(data, on_progress)))
}

fn progress_slices(
    data: Bytes,
    on_progress: ProgressSink,
) -> impl Iterator<Item = std::io::Result<Bytes>> + Send + 'static {
    let total = data.len() as u64;
    let slices: Vec<Bytes> = (0..data.len())
        .step_by(PROGRESS_SLICE)
        .map(|start| data.slice(start..data.len().min(start + PROGRESS_SLICE)))
        .collect();

    let mut sent = 0u64;
    slices.into_iter().map(move |slice| {
        sent += slice.len() as u64;
        on_progress(ProgressInfo::from_bytes(sent, Some(total)));
        Ok(slice)
    })
}

/// Decode a JSON body, mapping error envelopes and error statuses
async fn read_json<T>(response: Response, cancel: &CancellationToken) -> Result<T>
where
    T: DeserializeOwned,
{
    let status = response.status();
    let body = cancellable(cancel, response.bytes()).await??;
    decode_body(status.as_u16(), &body)
}

fn decode_body<T>(status: u16, body: &[u8]) -> Result<T>
where
    T: DeserializeOwned,
{
    if let Ok(envelope) = serde_json::from_slice::<ErrorEnvelope>(body) {
        return Err(UploadError::Api {
            status: envelope.error.status_code,
            message: envelope.error.content,
        });
    }

    if !(200..300).contains(&status) {
        return Err(UploadError::Api {
            status,
            message: String::from_utf8_lossy(body).into_owned(),
        });
    }

    Ok(serde_json::from_slice(body)?)
}
