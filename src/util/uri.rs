use crate::model::error::{Result, StoreError};

const S3_SCHEME: &str = "s3://";

/// A CLI object location: `s3://bucket/key` or `bucket/key`.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectUri {
    pub bucket: String,
    pub key: String,
}

pub fn is_remote(arg: &str) -> bool {
    arg.starts_with(S3_SCHEME)
}

pub fn parse_bucket(arg: &str) -> Result<String> {
    let rest = arg.strip_prefix(S3_SCHEME).unwrap_or(arg);
    let bucket = rest.trim_end_matches('/');

    if bucket.is_empty() || bucket.contains('/') {
        return Err(StoreError::InvalidArgument(format!(
            "failed to parse bucket of: {}",
            arg
        )));
    }

    Ok(bucket.to_string())
}

pub fn parse_object(arg: &str) -> Result<ObjectUri> {
    let rest = arg.strip_prefix(S3_SCHEME).unwrap_or(arg);

    match rest.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => Ok(ObjectUri {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }),
        _ => Err(StoreError::InvalidArgument(format!(
            "failed to parse bucket/key of: {}",
            arg
        ))),
    }
}

/// Splits `s3://bucket[/prefix]` into bucket and a possibly empty prefix.
pub fn parse_listing(arg: &str) -> Result<(String, String)> {
    let rest = arg.strip_prefix(S3_SCHEME).unwrap_or(arg);
    let (bucket, prefix) = rest.split_once('/').unwrap_or((rest, ""));

    if bucket.is_empty() {
        return Err(StoreError::InvalidArgument(format!(
            "failed to parse bucket of: {}",
            arg
        )));
    }

    Ok((bucket.to_string(), prefix.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bucket() {
        let cases = vec![
            ("s3://bucket", Some("bucket")),
            ("s3://bucket/", Some("bucket")),
            ("bucket", Some("bucket")),
            ("s3://", None),
            ("s3://bucket/key", None),
        ];

        for (input, expected) in cases {
            let result = parse_bucket(input).ok();
            assert_eq!(result.as_deref(), expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_parse_object() {
        let cases = vec![
            ("s3://bucket/key.txt", Some(("bucket", "key.txt"))),
            ("s3://bucket/dir/key.txt", Some(("bucket", "dir/key.txt"))),
            ("bucket/key.txt", Some(("bucket", "key.txt"))),
            ("s3://bucket", None),
            ("s3://bucket/", None),
            ("s3:///key", None),
        ];

        for (input, expected) in cases {
            let result = parse_object(input).ok();
            let expected = expected.map(|(bucket, key)| ObjectUri {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
            assert_eq!(result, expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_parse_listing() {
        let cases = vec![
            ("s3://bucket", Some(("bucket", ""))),
            ("s3://bucket/", Some(("bucket", ""))),
            ("s3://bucket/dir/", Some(("bucket", "dir/"))),
            ("bucket/dir/sub", Some(("bucket", "dir/sub"))),
            ("s3://", None),
        ];

        for (input, expected) in cases {
            let result = parse_listing(input).ok();
            let expected = expected.map(|(b, p)| (b.to_string(), p.to_string()));
            assert_eq!(result, expected, "failed for case: {}", input);
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("s3://bucket/key"));
        assert!(!is_remote("./local/file"));
        assert!(!is_remote("bucket/key"));
    }
}
