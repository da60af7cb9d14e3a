//! SQL layer for ads, comments, tags, and favorites.
//!
//! Mutations are gated by the explicit authorize functions: a missing
//! record and a record owned by someone else produce the same `NotFound`,
//! so a non-owner learns nothing from the response.

use std::collections::HashSet;

use rusqlite::{params, Connection, OptionalExtension};

use crate::db::models::{Ad, Comment};
use crate::error::{AppError, AppResult};

/// Page size of the ad list; the list view is a snapshot, not a feed.
pub const LIST_LIMIT: usize = 10;

/// An ad joined with its owner's username for display.
#[derive(Debug, Clone)]
pub struct AdWithOwner {
    pub ad: Ad,
    pub owner_name: String,
}

/// A comment joined with its owner's username for display.
#[derive(Debug, Clone)]
pub struct CommentWithOwner {
    pub comment: Comment,
    pub owner_name: String,
}

/// Validated ad fields ready for insert/update.
#[derive(Debug, Clone)]
pub struct AdChanges {
    pub title: String,
    pub price: Option<String>,
    pub text: String,
    /// New picture path. `None` keeps the existing picture on update.
    pub picture: Option<String>,
    pub tags: Vec<String>,
}

fn ad_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ad> {
    Ok(Ad {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        price: row.get(3)?,
        text: row.get(4)?,
        picture: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const AD_COLUMNS: &str = "a.id, a.owner_id, a.title, a.price, a.text, a.picture, a.created_at, a.updated_at";

fn ad_with_owner_from_row(row: &rusqlite::Row) -> rusqlite::Result<AdWithOwner> {
    Ok(AdWithOwner {
        ad: ad_from_row(row)?,
        owner_name: row.get(8)?,
    })
}

// --- Ownership guard ---------------------------------------------------

/// Allow a mutation on an ad only for its owner. Absent ad and non-owner
/// are the same outcome. Returns the ad so callers don't re-query.
pub fn authorize_ad_mutation(conn: &Connection, ad_id: &str, user_id: &str) -> AppResult<Ad> {
    let ad = conn
        .query_row(
            &format!("SELECT {} FROM ads a WHERE a.id = ?1", AD_COLUMNS),
            params![ad_id],
            ad_from_row,
        )
        .optional()?;

    match ad {
        Some(ad) if ad.owner_id == user_id => Ok(ad),
        _ => Err(AppError::NotFound),
    }
}

/// Same rule for comments. Returns the comment; callers need its ad_id
/// before deletion for the redirect target.
pub fn authorize_comment_mutation(
    conn: &Connection,
    comment_id: &str,
    user_id: &str,
) -> AppResult<Comment> {
    let comment = conn
        .query_row(
            "SELECT id, ad_id, owner_id, text, created_at, updated_at \
             FROM comments WHERE id = ?1",
            params![comment_id],
            |row| {
                Ok(Comment {
                    id: row.get(0)?,
                    ad_id: row.get(1)?,
                    owner_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    match comment {
        Some(c) if c.owner_id == user_id => Ok(c),
        _ => Err(AppError::NotFound),
    }
}

// --- Ads ---------------------------------------------------------------

pub fn create_ad(conn: &Connection, owner_id: &str, changes: &AdChanges) -> AppResult<String> {
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO ads (id, owner_id, title, price, text, picture) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            owner_id,
            changes.title,
            changes.price,
            changes.text,
            changes.picture
        ],
    )?;
    set_tags(conn, &id, &changes.tags)?;
    Ok(id)
}

/// Apply changes in place and refresh `updated_at`. Caller must have run
/// the ownership guard first. A `None` picture keeps the current one.
pub fn update_ad(conn: &Connection, ad_id: &str, changes: &AdChanges) -> AppResult<()> {
    let n = conn.execute(
        "UPDATE ads SET title = ?2, price = ?3, text = ?4, \
         picture = COALESCE(?5, picture), updated_at = datetime('now') \
         WHERE id = ?1",
        params![
            ad_id,
            changes.title,
            changes.price,
            changes.text,
            changes.picture
        ],
    )?;
    if n == 0 {
        return Err(AppError::NotFound);
    }
    set_tags(conn, ad_id, &changes.tags)?;
    Ok(())
}

/// Delete an ad; comments, favorites, and tags go with it via cascade.
pub fn delete_ad(conn: &Connection, ad_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM ads WHERE id = ?1", params![ad_id])?;
    Ok(())
}

pub fn get_ad_with_owner(conn: &Connection, ad_id: &str) -> AppResult<AdWithOwner> {
    conn.query_row(
        &format!(
            "SELECT {}, u.username FROM ads a \
             JOIN users u ON u.id = a.owner_id WHERE a.id = ?1",
            AD_COLUMNS
        ),
        params![ad_id],
        ad_with_owner_from_row,
    )
    .optional()?
    .ok_or(AppError::NotFound)
}

/// The list view: newest-updated first, capped at [`LIST_LIMIT`]. A
/// non-empty query restricts to ads whose title or text contains it as a
/// case-insensitive substring.
pub fn list_ads(conn: &Connection, query: Option<&str>) -> AppResult<Vec<AdWithOwner>> {
    let select = format!(
        "SELECT {}, u.username FROM ads a JOIN users u ON u.id = a.owner_id",
        AD_COLUMNS
    );
    let order = "ORDER BY a.updated_at DESC, a.id DESC LIMIT ?1";

    let rows = match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => {
            let pattern = like_pattern(q);
            let sql = format!(
                "{} WHERE LOWER(a.title) LIKE ?2 ESCAPE '\\' \
                 OR LOWER(a.text) LIKE ?2 ESCAPE '\\' {}",
                select, order
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![LIST_LIMIT as i64, pattern], ad_with_owner_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
        None => {
            let sql = format!("{} {}", select, order);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![LIST_LIMIT as i64], ad_with_owner_from_row)?;
            rows.collect::<Result<Vec<_>, _>>()?
        }
    };

    Ok(rows)
}

/// Build a `%needle%` LIKE pattern, lowercased, with LIKE metacharacters
/// escaped so user input matches literally.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

// --- Tags --------------------------------------------------------------

/// Replace an ad's tag set wholesale.
pub fn set_tags(conn: &Connection, ad_id: &str, tags: &[String]) -> AppResult<()> {
    conn.execute("DELETE FROM ad_tags WHERE ad_id = ?1", params![ad_id])?;
    for tag in tags {
        conn.execute(
            "INSERT OR IGNORE INTO ad_tags (ad_id, tag) VALUES (?1, ?2)",
            params![ad_id, tag],
        )?;
    }
    Ok(())
}

pub fn tags_for_ad(conn: &Connection, ad_id: &str) -> AppResult<Vec<String>> {
    let mut stmt = conn.prepare("SELECT tag FROM ad_tags WHERE ad_id = ?1 ORDER BY tag")?;
    let tags = stmt
        .query_map(params![ad_id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tags)
}

// --- Comments ----------------------------------------------------------

pub fn create_comment(
    conn: &Connection,
    ad_id: &str,
    owner_id: &str,
    text: &str,
) -> AppResult<String> {
    // Parent must exist; FK would catch it, but 404 beats a 500
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM ads WHERE id = ?1",
        params![ad_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(AppError::NotFound);
    }

    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO comments (id, ad_id, owner_id, text) VALUES (?1, ?2, ?3, ?4)",
        params![id, ad_id, owner_id, text],
    )?;
    Ok(id)
}

pub fn delete_comment(conn: &Connection, comment_id: &str) -> AppResult<()> {
    conn.execute("DELETE FROM comments WHERE id = ?1", params![comment_id])?;
    Ok(())
}

pub fn comments_for_ad(conn: &Connection, ad_id: &str) -> AppResult<Vec<CommentWithOwner>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.ad_id, c.owner_id, c.text, c.created_at, c.updated_at, u.username \
         FROM comments c JOIN users u ON u.id = c.owner_id \
         WHERE c.ad_id = ?1 ORDER BY c.updated_at DESC, c.id DESC",
    )?;
    let rows = stmt
        .query_map(params![ad_id], |row| {
            Ok(CommentWithOwner {
                comment: Comment {
                    id: row.get(0)?,
                    ad_id: row.get(1)?,
                    owner_id: row.get(2)?,
                    text: row.get(3)?,
                    created_at: row.get(4)?,
                    updated_at: row.get(5)?,
                },
                owner_name: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// --- Favorites ---------------------------------------------------------

/// Idempotent: a second add for the same (user, ad) is absorbed by the
/// composite primary key via INSERT OR IGNORE.
pub fn add_favorite(conn: &Connection, user_id: &str, ad_id: &str) -> AppResult<()> {
    ensure_ad_exists(conn, ad_id)?;
    conn.execute(
        "INSERT OR IGNORE INTO favorites (user_id, ad_id) VALUES (?1, ?2)",
        params![user_id, ad_id],
    )?;
    Ok(())
}

/// Idempotent: removing a favorite that isn't there is success.
pub fn remove_favorite(conn: &Connection, user_id: &str, ad_id: &str) -> AppResult<()> {
    ensure_ad_exists(conn, ad_id)?;
    conn.execute(
        "DELETE FROM favorites WHERE user_id = ?1 AND ad_id = ?2",
        params![user_id, ad_id],
    )?;
    Ok(())
}

pub fn favorite_ad_ids(conn: &Connection, user_id: &str) -> AppResult<HashSet<String>> {
    let mut stmt = conn.prepare("SELECT ad_id FROM favorites WHERE user_id = ?1")?;
    let ids = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(ids)
}

fn ensure_ad_exists(conn: &Connection, ad_id: &str) -> AppResult<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM ads WHERE id = ?1",
        params![ad_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_user;
    use crate::db::test_pool;
    use crate::state::DbPool;

    fn setup() -> (DbPool, String, String) {
        let pool = test_pool();
        let alice = create_user(&pool, "alice", "pw-alice").unwrap();
        let bob = create_user(&pool, "bob", "pw-bob").unwrap();
        (pool, alice, bob)
    }

    fn changes(title: &str, text: &str) -> AdChanges {
        AdChanges {
            title: title.to_string(),
            price: None,
            text: text.to_string(),
            picture: None,
            tags: vec![],
        }
    }

    #[test]
    fn create_and_fetch_ad() {
        let (pool, alice, _) = setup();
        let conn = pool.get().unwrap();

        let mut c = changes("Old bike", "A sturdy city bike");
        c.price = Some("50.00".to_string());
        c.tags = vec!["bike".into(), "used".into()];
        let id = create_ad(&conn, &alice, &c).unwrap();

        let found = get_ad_with_owner(&conn, &id).unwrap();
        assert_eq!(found.ad.title, "Old bike");
        assert_eq!(found.ad.price.as_deref(), Some("50.00"));
        assert_eq!(found.owner_name, "alice");
        assert_eq!(tags_for_ad(&conn, &id).unwrap(), vec!["bike", "used"]);
    }

    #[test]
    fn get_missing_ad_is_not_found() {
        let (pool, _, _) = setup();
        let conn = pool.get().unwrap();
        assert!(matches!(
            get_ad_with_owner(&conn, "no-such-id"),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn owner_may_mutate_others_get_not_found() {
        let (pool, alice, bob) = setup();
        let conn = pool.get().unwrap();
        let id = create_ad(&conn, &alice, &changes("Lamp", "Desk lamp")).unwrap();

        assert!(authorize_ad_mutation(&conn, &id, &alice).is_ok());
        // Non-owner and nonexistent id produce the identical outcome
        assert!(matches!(
            authorize_ad_mutation(&conn, &id, &bob),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            authorize_ad_mutation(&conn, "no-such-id", &bob),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn update_replaces_fields_and_tags() {
        let (pool, alice, _) = setup();
        let conn = pool.get().unwrap();
        let mut c = changes("Lamp", "Desk lamp");
        c.tags = vec!["lamp".into()];
        let id = create_ad(&conn, &alice, &c).unwrap();

        let mut c2 = changes("Better lamp", "Refurbished desk lamp");
        c2.price = Some("12.50".to_string());
        c2.tags = vec!["lamp".into(), "refurbished".into()];
        update_ad(&conn, &id, &c2).unwrap();

        let found = get_ad_with_owner(&conn, &id).unwrap();
        assert_eq!(found.ad.title, "Better lamp");
        assert_eq!(found.ad.price.as_deref(), Some("12.50"));
        assert_eq!(
            tags_for_ad(&conn, &id).unwrap(),
            vec!["lamp", "refurbished"]
        );
    }

    #[test]
    fn update_keeps_picture_when_none_given() {
        let (pool, alice, _) = setup();
        let conn = pool.get().unwrap();
        let mut c = changes("Lamp", "Desk lamp");
        c.picture = Some("ads_images/abc.png".to_string());
        let id = create_ad(&conn, &alice, &c).unwrap();

        update_ad(&conn, &id, &changes("Lamp v2", "Still a lamp")).unwrap();
        let found = get_ad_with_owner(&conn, &id).unwrap();
        assert_eq!(found.ad.picture.as_deref(), Some("ads_images/abc.png"));
    }

    #[test]
    fn delete_cascades_comments_favorites_and_tags() {
        let (pool, alice, bob) = setup();
        let conn = pool.get().unwrap();
        let mut c = changes("Lamp", "Desk lamp");
        c.tags = vec!["lamp".into()];
        let id = create_ad(&conn, &alice, &c).unwrap();
        create_comment(&conn, &id, &bob, "is it bright?").unwrap();
        add_favorite(&conn, &bob, &id).unwrap();

        delete_ad(&conn, &id).unwrap();

        let count = |sql: &str| -> i64 {
            conn.query_row(sql, params![id], |row| row.get(0)).unwrap()
        };
        assert_eq!(count("SELECT COUNT(*) FROM comments WHERE ad_id = ?1"), 0);
        assert_eq!(count("SELECT COUNT(*) FROM favorites WHERE ad_id = ?1"), 0);
        assert_eq!(count("SELECT COUNT(*) FROM ad_tags WHERE ad_id = ?1"), 0);
    }

    #[test]
    fn list_caps_at_ten_newest_first() {
        let (pool, alice, _) = setup();
        let conn = pool.get().unwrap();
        for i in 0..15 {
            create_ad(&conn, &alice, &changes(&format!("Ad {}", i), "text")).unwrap();
        }

        let ads = list_ads(&conn, None).unwrap();
        assert_eq!(ads.len(), LIST_LIMIT);
        // uuid v7 ids are time-ordered, so the tiebreak keeps insert order
        assert_eq!(ads[0].ad.title, "Ad 14");
        assert_eq!(ads[9].ad.title, "Ad 5");
    }

    #[test]
    fn search_matches_text_field_case_insensitively() {
        let (pool, alice, _) = setup();
        let conn = pool.get().unwrap();
        create_ad(&conn, &alice, &changes("Bike", "Shimano GEARS included")).unwrap();
        create_ad(&conn, &alice, &changes("Lamp", "No gears here either")).unwrap();
        create_ad(&conn, &alice, &changes("Chair", "Four legs")).unwrap();

        let hits = list_ads(&conn, Some("gEaRs")).unwrap();
        let titles: Vec<_> = hits.iter().map(|a| a.ad.title.as_str()).collect();
        assert_eq!(titles, vec!["Lamp", "Bike"]);
    }

    #[test]
    fn search_treats_like_metacharacters_literally() {
        let (pool, alice, _) = setup();
        let conn = pool.get().unwrap();
        create_ad(&conn, &alice, &changes("Discount", "100% cotton shirt")).unwrap();
        create_ad(&conn, &alice, &changes("Socks", "plain wool")).unwrap();

        let hits = list_ads(&conn, Some("100% cotton")).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].ad.title, "Discount");

        // A bare % must not act as a wildcard
        assert!(list_ads(&conn, Some("%wool%")).unwrap().is_empty());
    }

    #[test]
    fn blank_search_returns_everything_up_to_cap() {
        let (pool, alice, _) = setup();
        let conn = pool.get().unwrap();
        create_ad(&conn, &alice, &changes("Bike", "text")).unwrap();

        assert_eq!(list_ads(&conn, Some("")).unwrap().len(), 1);
        assert_eq!(list_ads(&conn, Some("   ")).unwrap().len(), 1);
    }

    #[test]
    fn add_favorite_is_idempotent() {
        let (pool, alice, bob) = setup();
        let conn = pool.get().unwrap();
        let id = create_ad(&conn, &alice, &changes("Lamp", "Desk lamp")).unwrap();

        add_favorite(&conn, &bob, &id).unwrap();
        add_favorite(&conn, &bob, &id).unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND ad_id = ?2",
                params![bob, id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
        assert!(favorite_ad_ids(&conn, &bob).unwrap().contains(&id));
    }

    #[test]
    fn remove_missing_favorite_is_success() {
        let (pool, alice, bob) = setup();
        let conn = pool.get().unwrap();
        let id = create_ad(&conn, &alice, &changes("Lamp", "Desk lamp")).unwrap();

        remove_favorite(&conn, &bob, &id).unwrap();

        add_favorite(&conn, &bob, &id).unwrap();
        remove_favorite(&conn, &bob, &id).unwrap();
        assert!(favorite_ad_ids(&conn, &bob).unwrap().is_empty());
    }

    #[test]
    fn favorite_on_missing_ad_is_not_found() {
        let (pool, _, bob) = setup();
        let conn = pool.get().unwrap();
        assert!(matches!(
            add_favorite(&conn, &bob, "no-such-ad"),
            Err(AppError::NotFound)
        ));
        assert!(matches!(
            remove_favorite(&conn, &bob, "no-such-ad"),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn comments_ordered_newest_first() {
        let (pool, alice, bob) = setup();
        let conn = pool.get().unwrap();
        let id = create_ad(&conn, &alice, &changes("Lamp", "Desk lamp")).unwrap();
        create_comment(&conn, &id, &bob, "first!").unwrap();
        create_comment(&conn, &id, &alice, "thanks for looking").unwrap();

        let comments = comments_for_ad(&conn, &id).unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].comment.text, "thanks for looking");
        assert_eq!(comments[0].owner_name, "alice");
        assert_eq!(comments[1].owner_name, "bob");
    }

    #[test]
    fn comment_on_missing_ad_is_not_found() {
        let (pool, _, bob) = setup();
        let conn = pool.get().unwrap();
        assert!(matches!(
            create_comment(&conn, "no-such-ad", &bob, "hello"),
            Err(AppError::NotFound)
        ));
    }

    #[test]
    fn comment_guard_mirrors_ad_guard() {
        let (pool, alice, bob) = setup();
        let conn = pool.get().unwrap();
        let ad = create_ad(&conn, &alice, &changes("Lamp", "Desk lamp")).unwrap();
        let comment = create_comment(&conn, &ad, &bob, "is it bright?").unwrap();

        let found = authorize_comment_mutation(&conn, &comment, &bob).unwrap();
        assert_eq!(found.ad_id, ad);
        assert!(matches!(
            authorize_comment_mutation(&conn, &comment, &alice),
            Err(AppError::NotFound)
        ));
    }
}
