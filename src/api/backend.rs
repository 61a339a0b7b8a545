use std::sync::Arc;
use std::time::Duration;

use crate::api::{
    AuthService, BlobStore, DocumentStore, FirebaseAuth, FirebaseStorage, FirestoreClient,
    MemoryAuth, MemoryBlobStore, MemoryStore, Principal,
};
use crate::config::{Config, FirebaseConfig};
use crate::error::LmsResult;

/// The managed services a signed-in session talks to.
#[derive(Clone)]
pub struct Session {
    pub principal: Principal,
    pub store: Arc<dyn DocumentStore>,
    pub blobs: Arc<dyn BlobStore>,
}

/// Which managed backend the client runs against.
#[derive(Clone)]
pub enum Backend {
    Firebase {
        config: FirebaseConfig,
        poll_interval: Duration,
    },
    Offline {
        store: MemoryStore,
        auth: MemoryAuth,
    },
}

impl Backend {
    pub fn from_config(config: &Config) -> Self {
        match &config.firebase {
            Some(firebase) => Backend::Firebase {
                config: firebase.clone(),
                poll_interval: config.poll_interval,
            },
            None => Backend::Offline {
                store: MemoryStore::new(),
                auth: MemoryAuth::demo(),
            },
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Backend::Firebase { config, .. } => format!("Firebase project {}", config.project_id),
            Backend::Offline { .. } => "offline (in-memory)".to_string(),
        }
    }

    pub fn auth(&self) -> LmsResult<Arc<dyn AuthService>> {
        Ok(match self {
            Backend::Firebase { config, .. } => Arc::new(FirebaseAuth::new(&config.api_key)?),
            Backend::Offline { auth, .. } => Arc::new(auth.clone()),
        })
    }

    /// Bind the document and file stores to the signed-in user.
    pub fn connect(&self, principal: Principal) -> LmsResult<Session> {
        let (store, blobs): (Arc<dyn DocumentStore>, Arc<dyn BlobStore>) = match self {
            Backend::Firebase {
                config,
                poll_interval,
            } => {
                let mut firestore = FirestoreClient::new(config, *poll_interval)?;
                if let Some(token) = &principal.id_token {
                    firestore = firestore.with_id_token(token.clone());
                }
                let storage =
                    FirebaseStorage::new(config.storage_bucket.clone(), principal.id_token.clone())?;
                (Arc::new(firestore), Arc::new(storage))
            }
            Backend::Offline { store, .. } => (Arc::new(store.clone()), Arc::new(MemoryBlobStore)),
        };

        Ok(Session {
            principal,
            store,
            blobs,
        })
    }
}
