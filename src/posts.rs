use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    io::ErrorKind,
    sync::{Arc, RwLock},
    time::Instant,
};

#[derive(Debug, Clone, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,

    pub username: String,
    pub post_text: String,
}

impl PartialEq for Post {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreate {
    pub username: String,
    pub post_text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("username is too short")]
    UsernameTooShort,

    #[error("username must contain only letters")]
    UsernameNotAlphabetic,

    #[error("post cannot be empty")]
    EmptyPost,
}

impl PostCreate {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.chars().count() < 2 {
            return Err(ValidationError::UsernameTooShort);
        }
        if !self.username.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ValidationError::UsernameNotAlphabetic);
        }
        if self.post_text.is_empty() {
            return Err(ValidationError::EmptyPost);
        }
        Ok(())
    }
}

pub trait PostManager: Send + Sync {
    fn list(&self) -> anyhow::Result<Vec<Post>>;
    fn create(&self, post_create: PostCreate) -> anyhow::Result<Post>;
    fn total(&self) -> anyhow::Result<usize>;
}

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Post>>>,
    path: String,
}

const CSV_HEADERS: [&str; 3] = ["id", "username", "post_text"];

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new database at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;
        let iter = csv_reader.records();

        let mut posts = vec![];
        for record in iter {
            let record = record?;
            let id = record
                .get(0)
                .ok_or(anyhow!("couldnt get record id"))?
                .parse::<u64>()?;
            let username = record
                .get(1)
                .ok_or(anyhow!("couldnt get record username"))?
                .to_string();
            let post_text = record
                .get(2)
                .ok_or(anyhow!("couldnt get record post_text"))?
                .to_string();

            posts.push(Post {
                id,
                username,
                post_text,
            });
        }

        log::debug!(
            "took {}ms to read csv",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        let mgr = BackendCsv {
            list: Arc::new(RwLock::new(posts)),
            path: path.to_string(),
        };

        Ok(mgr)
    }

    pub fn save(&self) {
        let posts = self.list.write().unwrap();

        let temp_path = format!("{}-tmp", &self.path);
        let mut csv_wrt = csv::Writer::from_path(&temp_path).unwrap();
        csv_wrt.write_record(CSV_HEADERS).unwrap();
        for post in posts.iter() {
            csv_wrt
                .write_record([&post.id.to_string(), &post.username, &post.post_text])
                .unwrap();
        }
        csv_wrt.flush().unwrap();
        std::fs::rename(&temp_path, &self.path).unwrap();
    }
}

impl PostManager for BackendCsv {
    fn list(&self) -> anyhow::Result<Vec<Post>> {
        Ok(self.list.read().unwrap().clone())
    }

    fn create(&self, post_create: PostCreate) -> anyhow::Result<Post> {
        let id = if let Some(last_post) = self.list.write().unwrap().last() {
            last_post.id + 1
        } else {
            0
        };

        let post = Post {
            id,
            username: post_create.username,
            post_text: post_create.post_text,
        };

        self.list.write().unwrap().push(post.clone());

        self.save();

        Ok(post)
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.list.read().unwrap().len())
    }
}
