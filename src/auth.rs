use std::{future::Future, pin::Pin, sync::Arc};

use gcp_auth::AuthenticationManager;
use http::HeaderValue;
use tower::{filter::AsyncPredicate, BoxError};

const DATABASE_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/spanner.data",
];

const ADMIN_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/spanner.data",
    "https://www.googleapis.com/auth/spanner.admin",
];

/// How a connection authenticates its requests.
#[derive(Clone)]
pub enum Credentials {
    /// Discover credentials from the environment, see [`AuthenticationManager::new`].
    Default,
    /// Send unauthenticated requests, e.g. to the Cloud Spanner emulator.
    None,
    Manager(Arc<AuthenticationManager>),
}

impl Default for Credentials {
    fn default() -> Self {
        Credentials::Default
    }
}

impl Credentials {
    pub(crate) async fn manager(&self) -> Result<Option<Arc<AuthenticationManager>>, crate::Error> {
        match self {
            Credentials::None => Ok(None),
            Credentials::Manager(manager) => Ok(Some(manager.clone())),
            Credentials::Default => AuthenticationManager::new()
                .await
                .map(|manager| Some(Arc::new(manager)))
                .map_err(|err| crate::Error::Config(format!("unable to find credentials: {}", err))),
        }
    }
}

/// Session and query RPCs use the data scopes, DDL and existence checks go through the admin APIs.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Scopes {
    Database,
    Admin,
}

impl Scopes {
    fn as_slice(&self) -> &[&str] {
        match self {
            Scopes::Database => &DATABASE_SCOPES,
            Scopes::Admin => &ADMIN_SCOPES,
        }
    }
}

#[derive(Clone)]
pub(crate) struct AuthFilter {
    auth_manager: Arc<AuthenticationManager>,
    scopes: Scopes,
}

impl AuthFilter {
    pub(crate) fn new(auth_manager: Arc<AuthenticationManager>, scopes: Scopes) -> Self {
        Self {
            auth_manager,
            scopes,
        }
    }
}

impl AsyncPredicate<http::Request<tonic::body::BoxBody>> for AuthFilter {
    type Future = Pin<Box<dyn Future<Output = Result<Self::Request, BoxError>> + Send>>;

    type Request = http::Request<tonic::body::BoxBody>;

    fn check(&mut self, request: http::Request<tonic::body::BoxBody>) -> Self::Future {
        let filter = self.clone();
        Box::pin(async move {
            let token = filter
                .auth_manager
                .get_token(filter.scopes.as_slice())
                .await?;

            let header = HeaderValue::try_from(format!("Bearer {}", token.as_str()))
                .map_err(|err| crate::Error::Config(format!("invalid auth token: {}", err)))?;

            let (mut parts, body) = request.into_parts();
            parts.headers.insert(http::header::AUTHORIZATION, header);
            Ok(http::Request::from_parts(parts, body))
        })
    }
}
