use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub password_hash: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub price: Option<String>,
    pub text: String,
    pub picture: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub ad_id: String,
    pub owner_id: String,
    pub text: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Comment {
    /// Short display form for buttons and titles: anything longer than
    /// 15 chars is cut to 11 plus an ellipsis.
    pub fn excerpt(&self) -> String {
        if self.text.chars().count() > 15 {
            let head: String = self.text.chars().take(11).collect();
            format!("{}...", head)
        } else {
            self.text.clone()
        }
    }
}
