//! Tag index of thumbnail cutout images.

use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};

pub struct TagDb {
    conn: Connection,
}

impl TagDb {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::MissingFile(path.to_path_buf()));
        }
        Ok(Self {
            conn: Connection::open(path)?,
        })
    }

    /// Opens (creating if needed) a database with the tag schema in place.
    pub fn create(path: &Path) -> Result<Self> {
        let db = Self {
            conn: Connection::open(path)?,
        };
        db.init_schema()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn in_memory() -> Result<Self> {
        let db = Self {
            conn: Connection::open_in_memory()?,
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS images (
                image_id INTEGER PRIMARY KEY,
                filename TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS tags (
                tag_id INTEGER PRIMARY KEY,
                tag TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS image_tags (
                image_id INTEGER NOT NULL REFERENCES images(image_id),
                tag_id INTEGER NOT NULL REFERENCES tags(tag_id),
                PRIMARY KEY (image_id, tag_id)
            );",
        )?;
        Ok(())
    }

    pub fn add_image(&self, filename: &str, tags: &[String]) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO images (filename) VALUES (?1)",
            params![filename],
        )?;
        let image_id: i64 = self.conn.query_row(
            "SELECT image_id FROM images WHERE filename = ?1",
            params![filename],
            |row| row.get(0),
        )?;
        for tag in tags {
            let tag = tag.trim().to_lowercase();
            self.conn
                .execute("INSERT OR IGNORE INTO tags (tag) VALUES (?1)", params![tag])?;
            self.conn.execute(
                "INSERT OR IGNORE INTO image_tags (image_id, tag_id)
                 SELECT ?1, tag_id FROM tags WHERE tag = ?2",
                params![image_id, tag],
            )?;
        }
        Ok(())
    }

    /// Filenames of images carrying every one of `tags`.
    pub fn find_images_with_tags(&self, tags: &[String]) -> Result<Vec<String>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; tags.len()].join(", ");
        let sql = format!(
            "SELECT i.filename FROM images i
             JOIN image_tags it ON it.image_id = i.image_id
             JOIN tags t ON t.tag_id = it.tag_id
             WHERE t.tag IN ({placeholders})
             GROUP BY i.image_id
             HAVING COUNT(DISTINCT t.tag_id) = {}
             ORDER BY i.filename",
            distinct_count(tags)
        );
        let wanted: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(wanted.iter()), |row| row.get::<_, String>(0))?;
        let mut images = Vec::new();
        for image in rows {
            images.push(image?);
        }
        debug!("{} images carry all of {:?}", images.len(), tags);
        Ok(images)
    }

    pub fn image_tags(&self, filename: &str) -> Result<Vec<String>> {
        let image_id: Option<i64> = self
            .conn
            .query_row(
                "SELECT image_id FROM images WHERE filename = ?1",
                params![filename],
                |row| row.get(0),
            )
            .optional()?;
        let Some(image_id) = image_id else {
            return Err(Error::NotFound(format!("image {filename} in tag database")));
        };
        let mut stmt = self.conn.prepare(
            "SELECT t.tag FROM image_tags it JOIN tags t ON t.tag_id = it.tag_id
             WHERE it.image_id = ?1 ORDER BY t.tag",
        )?;
        let rows = stmt.query_map(params![image_id], |row| row.get::<_, String>(0))?;
        let mut tags = Vec::new();
        for tag in rows {
            tags.push(tag?);
        }
        Ok(tags)
    }

    /// Tags assigned to at least `min_images` images.
    pub fn tags_used_at_least(&self, min_images: usize) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT t.tag FROM tags t JOIN image_tags it ON it.tag_id = t.tag_id
             GROUP BY t.tag_id HAVING COUNT(*) >= ?1 ORDER BY t.tag",
        )?;
        let rows = stmt.query_map(params![min_images as i64], |row| row.get::<_, String>(0))?;
        let mut tags = Vec::new();
        for tag in rows {
            tags.push(tag?);
        }
        Ok(tags)
    }
}

fn distinct_count(tags: &[String]) -> usize {
    let mut unique: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
    unique.sort();
    unique.dedup();
    unique.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn sample() -> TagDb {
        let db = TagDb::in_memory().unwrap();
        db.add_image("angry_mom.png", &tags(&["woman", "mother", "angry"])).unwrap();
        db.add_image("sad_dad.png", &tags(&["man", "father", "sad"])).unwrap();
        db.add_image("angry_guy.png", &tags(&["man", "angry"])).unwrap();
        db
    }

    #[test]
    fn images_must_carry_all_tags() {
        let db = sample();
        assert_eq!(
            db.find_images_with_tags(&tags(&["angry"])).unwrap(),
            vec!["angry_guy.png", "angry_mom.png"]
        );
        assert_eq!(
            db.find_images_with_tags(&tags(&["angry", "man"])).unwrap(),
            vec!["angry_guy.png"]
        );
        assert!(db.find_images_with_tags(&tags(&["angry", "dragon"])).unwrap().is_empty());
        assert_eq!(
            db.find_images_with_tags(&tags(&["angry", "angry"])).unwrap().len(),
            2
        );
    }

    #[test]
    fn tags_of_image_and_usage_counts() {
        let db = sample();
        assert_eq!(db.image_tags("sad_dad.png").unwrap(), vec!["father", "man", "sad"]);
        assert!(db.image_tags("missing.png").is_err());
        assert_eq!(db.tags_used_at_least(2).unwrap(), vec!["angry", "man"]);
    }

    #[test]
    fn file_database_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("database.db");
        assert!(TagDb::open(&path).is_err());
        TagDb::create(&path)
            .unwrap()
            .add_image("a.png", &tags(&["Happy "]))
            .unwrap();
        let db = TagDb::open(&path).unwrap();
        assert_eq!(db.image_tags("a.png").unwrap(), vec!["happy"]);
    }
}
