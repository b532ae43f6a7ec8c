//! Substring fallback used while the embedding model is unavailable.

use crate::posts::Post;

/// Case-insensitive substring search over username and post text.
///
/// An empty query returns the full corpus unfiltered. Order is
/// preserved.
pub fn substring_search(posts: &[Post], query: &str) -> Vec<Post> {
    if query.is_empty() {
        return posts.to_vec();
    }

    let needle = query.to_lowercase();
    posts
        .iter()
        .filter(|post| {
            post.username.to_lowercase().contains(&needle)
                || post.post_text.to_lowercase().contains(&needle)
        })
        .cloned()
        .collect()
}
