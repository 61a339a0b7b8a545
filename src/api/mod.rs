mod auth;
mod backend;
mod firestore;
mod memory;
mod storage;
mod store;

pub use auth::{AuthService, FirebaseAuth, MemoryAuth, Principal};
pub use backend::{Backend, Session};
pub use firestore::FirestoreClient;
pub use memory::MemoryStore;
pub use storage::{is_reference, upload_file, BlobStore, FirebaseStorage, MemoryBlobStore};
pub use store::{Collection, DocumentStore, RawDoc, SnapshotCallback, Subscription};
