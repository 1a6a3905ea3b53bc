pub mod invitation;
pub mod library;
pub mod lodge;
pub mod membership;
pub mod message;
pub mod profile;
pub mod tenue;

use serde::{Deserialize, Deserializer, Serialize};

pub use invitation::{Invitation, NewInvitation};
pub use library::{LibraryEntry, LibraryEntryUpdate, LibraryKind, NewLibraryEntry};
pub use lodge::{Lodge, LodgeCounts, LodgeUpdate, NewLodge};
pub use membership::{
    LodgeMembership, MemberEntry, MemberRole, MembershipUpdate, MembershipWithLodge,
    NewMembership,
};
pub use message::{Attachment, Conversation, Message, MessageRead, NewMessage};
pub use profile::{Profile, ProfileUpdate, ProfileView};
pub use tenue::{
    AgendaItem, Attendance, AttendanceStatus, NewTenue, OfficerAssignment, PlancheRef, Tenue,
    TenueStatus, TenueUpdate,
};

/// One page of a counted, range-limited listing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(self.page_size as u64)
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }
}

/// JSON `null` and a missing field both decode to `T::default()`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
