//! Object-created trigger event and invocation metadata.

use serde::Deserialize;

use crate::errors::ScanError;

/// Object-created notification; only the first record is consumed.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectCreatedEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    pub s3: StorageEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageEntity {
    pub bucket: BucketEntity,
    pub object: ObjectEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BucketEntity {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectEntity {
    pub key: String,
}

/// Bucket and key of the object to process.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub key: String,
}

impl ObjectCreatedEvent {
    pub fn from_json(data: &[u8]) -> Result<Self, ScanError> {
        serde_json::from_slice(data)
            .map_err(|e| ScanError::InvalidTrigger(format!("Event is not valid JSON: {e}")))
    }

    /// Location named by `Records[0]`.
    pub fn object(&self) -> Result<ObjectLocation, ScanError> {
        let record = self
            .records
            .first()
            .ok_or_else(|| ScanError::InvalidTrigger("Event has no records".to_string()))?;
        Ok(ObjectLocation {
            bucket: record.s3.bucket.name.clone(),
            key: record.s3.object.key.clone(),
        })
    }
}

/// Account and region extracted from the invoked function's ARN.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationIdentity {
    pub account_id: String,
    pub region: String,
}

impl InvocationIdentity {
    /// `arn:partition:service:region:account:...` split on `:`.
    pub fn from_function_arn(arn: &str) -> Result<Self, ScanError> {
        let fields: Vec<&str> = arn.split(':').collect();
        if fields.len() < 5 {
            return Err(ScanError::InvalidTrigger(format!(
                "Invoked function ARN '{arn}' has too few fields"
            )));
        }
        Ok(Self {
            account_id: fields[4].to_string(),
            region: fields[3].to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &str = r#"{
        "Records": [
            {"s3": {"bucket": {"name": "scap-reports"}, "object": {"key": "i-0abc/scan.xml", "size": 1024}}},
            {"s3": {"bucket": {"name": "other"}, "object": {"key": "i-0def/scan.xml"}}}
        ]
    }"#;

    #[test]
    fn consumes_first_record() {
        let event = ObjectCreatedEvent::from_json(EVENT.as_bytes()).unwrap();
        let object = event.object().unwrap();
        assert_eq!(object.bucket, "scap-reports");
        assert_eq!(object.key, "i-0abc/scan.xml");
    }

    #[test]
    fn empty_records_is_invalid() {
        let event = ObjectCreatedEvent::from_json(br#"{"Records": []}"#).unwrap();
        assert!(matches!(event.object(), Err(ScanError::InvalidTrigger(_))));
    }

    #[test]
    fn rejects_non_json() {
        assert!(ObjectCreatedEvent::from_json(b"<xml/>").is_err());
    }

    #[test]
    fn identity_from_arn() {
        let id = InvocationIdentity::from_function_arn(
            "arn:aws:lambda:us-east-1:123456789012:function:scap-ingest",
        )
        .unwrap();
        assert_eq!(id.account_id, "123456789012");
        assert_eq!(id.region, "us-east-1");
    }

    #[test]
    fn short_arn_is_invalid() {
        let err = InvocationIdentity::from_function_arn("arn:aws:lambda").unwrap_err();
        assert!(err.is_fatal());
    }
}
