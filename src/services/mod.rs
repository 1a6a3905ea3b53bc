//! The data-access layer. Every call returns a [`ServiceResult`] envelope
//! and never fails past it.

pub mod auth;
pub mod base;
pub mod invitation;
pub mod library;
pub mod lodge;
pub mod member;
pub mod message;
pub mod storage;
pub mod tenue;

use std::sync::Arc;

pub use auth::{AuthService, AuthState};
pub use base::{ServiceResult, Status, run};
pub use invitation::InvitationService;
pub use library::{LibraryQuery, LibraryService};
pub use lodge::{FoundedLodge, LodgeQuery, LodgeService};
pub use member::{MemberQuery, MemberService};
pub use message::MessageService;
pub use storage::{FileEntry, FileUpload, StorageService, UploadedFile};
pub use tenue::{TenueQuery, TenueService};

use crate::auth::AuthApi;
use crate::backend::TableClient;
use crate::storage::ObjectStore;

/// Every service over one set of backends.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub members: MemberService,
    pub lodges: LodgeService,
    pub tenues: TenueService,
    pub storage: StorageService,
    pub invitations: InvitationService,
    pub messages: MessageService,
    pub library: LibraryService,
}

impl Services {
    pub fn new(
        db: Arc<dyn TableClient>,
        auth: Arc<dyn AuthApi>,
        objects: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            auth: AuthService::new(auth),
            members: MemberService::new(db.clone()),
            lodges: LodgeService::new(db.clone()),
            tenues: TenueService::new(db.clone()),
            storage: StorageService::new(objects),
            invitations: InvitationService::new(db.clone()),
            messages: MessageService::new(db.clone()),
            library: LibraryService::new(db),
        }
    }

    pub fn with_site_url(mut self, site_url: &str) -> Self {
        self.auth = self.auth.with_site_url(site_url);
        self
    }
}
