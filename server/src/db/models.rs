/// Database row types.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use serde::Serialize;

/// Anonymous user identified by a UUID and reachable through a short code.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub code: String,
    pub created_at: String,
}

/// Two users paired for synchronized capture.
/// `user_a_id` always sorts before `user_b_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pair {
    pub id: String,
    pub user_a_id: String,
    pub user_b_id: String,
    pub created_at: String,
}

impl Pair {
    /// The other member of the pair, or `None` if `user_id` is not a member.
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if self.user_a_id == user_id {
            Some(&self.user_b_id)
        } else if self.user_b_id == user_id {
            Some(&self.user_a_id)
        } else {
            None
        }
    }

    pub fn has_member(&self, user_id: &str) -> bool {
        self.partner_of(user_id).is_some()
    }

    pub fn members(&self) -> [&str; 2] {
        [&self.user_a_id, &self.user_b_id]
    }
}

/// Photo taken by one member of a pair.
#[derive(Debug, Clone, Serialize)]
pub struct Photo {
    pub id: String,
    pub pair_id: String,
    pub user_id: String,
    pub s3_url: String,
    pub taken_at: String,
    pub created_at: String,
}
