use time::OffsetDateTime;

/// One entry of a bucket listing. Common prefixes of a delimited listing
/// are reported with `is_prefix` set and no size.
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectEntry {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<OffsetDateTime>,
    pub etag: Option<String>,
    pub is_prefix: bool,
}

impl ObjectEntry {
    pub fn object(key: &str, size: i64) -> Self {
        Self {
            key: key.to_string(),
            size,
            last_modified: None,
            etag: None,
            is_prefix: false,
        }
    }

    pub fn prefix(key: &str) -> Self {
        Self {
            key: key.to_string(),
            size: 0,
            last_modified: None,
            etag: None,
            is_prefix: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ListRequest {
    pub prefix: Option<String>,
    pub delimiter: Option<String>,
    pub continuation_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub entries: Vec<ObjectEntry>,
    pub next_continuation_token: Option<String>,
}

/// A part accepted by the store during a multipart upload.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadedPart {
    pub part_number: i32,
    pub etag: Option<String>,
}
