use sha2::{Digest, Sha256};

const HASH_LEN: usize = 8;
const MAX_HUMAN_LEN: usize = 240;

/// Derives a CloudFormation logical id from a construct path.
///
/// The human part keeps only ASCII alphanumerics of every component; the
/// suffix is the first 8 hex digits of SHA-256 over the `/`-joined path, so
/// two paths that collapse to the same human part still get distinct ids.
pub fn logical_id(path: &[&str]) -> String {
    let human: String = path
        .iter()
        .flat_map(|component| component.chars())
        .filter(char::is_ascii_alphanumeric)
        .take(MAX_HUMAN_LEN)
        .collect();

    let mut hasher = Sha256::new();
    hasher.update(path.join("/"));
    let digest = format!("{:X}", hasher.finalize());

    format!("{human}{}", &digest[..HASH_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_non_alphanumerics_and_appends_hash() {
        let id = logical_id(&["SpringBootEksVpc", "PublicSubnet-1"]);
        assert!(id.starts_with("SpringBootEksVpcPublicSubnet1"));
        assert_eq!(id.len(), "SpringBootEksVpcPublicSubnet1".len() + HASH_LEN);
        assert!(id[id.len() - HASH_LEN..]
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }

    #[test]
    fn is_deterministic() {
        assert_eq!(logical_id(&["A", "B"]), logical_id(&["A", "B"]));
    }

    #[test]
    fn colliding_human_parts_get_distinct_ids() {
        assert_ne!(logical_id(&["Ab", "c"]), logical_id(&["A", "bc"]));
    }
}
