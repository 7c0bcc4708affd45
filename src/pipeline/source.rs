//! Password source: the remote polling loop exposed as a stream.

use async_stream::stream;
use futures::stream::Stream;
use std::sync::Arc;
use tracing::trace;

use crate::api::{PasswordRequest, RemoteService};
use crate::error::ApiError;

/// Poll `remote` for encrypted passwords using the session `token`.
///
/// Each item costs one remote call, made only when the item is pulled. The
/// first failed call is yielded as an error and ends the stream.
pub fn password_source(
    remote: Arc<dyn RemoteService>,
    token: String,
) -> impl Stream<Item = Result<String, ApiError>> + Send + 'static {
    stream! {
        loop {
            match remote.request_password(PasswordRequest::new(token.clone())).await {
                Ok(response) => {
                    trace!(password = %response.encrypted_password, "Fetched encrypted password");
                    yield Ok(response.encrypted_password);
                }
                Err(e) => {
                    yield Err(e);
                    break;
                }
            }
        }
    }
}
