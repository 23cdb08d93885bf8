//! Read-side visibility rules for private incidents.
//!
//! Public incidents are visible to every authenticated viewer. A private
//! incident is visible only to superusers and to users involved in it
//! (captain, reporter, or participant). An anonymous caller sees nothing.

use crate::domain::{Incident, User, UserId};

/// The user on whose behalf incidents are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewer {
    /// Viewing user
    pub user_id: UserId,

    /// Superusers bypass the private-incident restriction
    pub is_superuser: bool,
}

impl Viewer {
    /// A regular user.
    pub fn user(user_id: UserId) -> Self {
        Self {
            user_id,
            is_superuser: false,
        }
    }

    /// A superuser.
    pub fn superuser(user_id: UserId) -> Self {
        Self {
            user_id,
            is_superuser: true,
        }
    }
}

impl From<&User> for Viewer {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            is_superuser: user.is_superuser,
        }
    }
}

/// Whether `viewer` may see `incident`.
pub fn is_visible(incident: &Incident, viewer: &Viewer) -> bool {
    !incident.is_private || viewer.is_superuser || incident.involves(viewer.user_id)
}

/// Keep the incidents `viewer` may see, preserving order.
///
/// `None` is an anonymous caller and always gets an empty list.
pub fn filter_visible(
    incidents: impl IntoIterator<Item = Incident>,
    viewer: Option<&Viewer>,
) -> Vec<Incident> {
    let Some(viewer) = viewer else {
        return Vec::new();
    };
    incidents
        .into_iter()
        .filter(|incident| is_visible(incident, viewer))
        .collect()
}
