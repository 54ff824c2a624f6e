//! Parses the `<user>/<volume>` argument shared by `publish` and `mount`.

use anyhow::{bail, Result};

pub fn split(path: &str) -> Result<(String, String)> {
    let mut parts = path.splitn(2, '/');
    let owner = parts.next().filter(|s| !s.is_empty());
    let name = parts.next().filter(|s| !s.is_empty());
    match (owner, name) {
        (Some(owner), Some(name)) => Ok((owner.to_string(), name.to_string())),
        _ => bail!("expected <user>/<volume>, got {path:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_owner_and_name() {
        assert_eq!(split("alice/photos").unwrap(), ("alice".to_string(), "photos".to_string()));
    }

    #[test]
    fn keeps_slashes_inside_the_name() {
        assert_eq!(split("alice/photos/2024").unwrap(), ("alice".to_string(), "photos/2024".to_string()));
    }

    #[test]
    fn rejects_a_bare_owner() {
        assert!(split("alice").is_err());
    }

    #[test]
    fn rejects_an_empty_name() {
        assert!(split("alice/").is_err());
    }
}
