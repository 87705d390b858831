/*!
Object identifier generation.

UIDs have the shape `YYYY/MM/DD/HH/mm/ss/<uuid>/<name>`. The timestamp prefix
makes identifiers created in different seconds sort by creation time; the
random v4 token keeps identifiers created within the same second apart.
*/

use chrono::{DateTime, Local, TimeZone};
use uuid::Uuid;

/// Name substituted when the stored object carries no name of its own.
pub const DEFAULT_NAME: &str = "file";

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d/%H/%M/%S";

/// Generate a fresh UID for an object called `base_name`, stamped with the local time.
///
/// # Example
/// ```rust
/// use bucketstore_core::generate_uid;
///
/// let uid = generate_uid("photo.png");
/// assert!(uid.ends_with("/photo.png"));
/// assert_eq!(uid.split('/').count(), 8);
/// ```
pub fn generate_uid(base_name: &str) -> String {
    generate_uid_at(&Local::now(), base_name)
}

/// Generate a UID for `base_name` stamped with an explicit time.
pub fn generate_uid_at<Tz>(time: &DateTime<Tz>, base_name: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}/{}/{}",
        time.format(TIMESTAMP_FORMAT),
        Uuid::new_v4().hyphenated(),
        base_name
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn assert_uid_shape(uid: &str, name: &str) {
        let parts: Vec<&str> = uid.splitn(8, '/').collect();
        assert_eq!(parts.len(), 8, "unexpected uid: {uid}");

        assert_eq!(parts[0].len(), 4);
        for field in &parts[1..6] {
            assert_eq!(field.len(), 2, "unexpected field {field} in {uid}");
        }
        for field in &parts[0..6] {
            assert!(field.chars().all(|c| c.is_ascii_digit()));
        }

        assert_eq!(parts[6].len(), 36);
        assert!(parts[6]
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c) || c == '-'));
        assert!(Uuid::parse_str(parts[6]).is_ok());

        assert_eq!(parts[7], name);
    }

    #[test]
    fn test_uid_structure() {
        let uid = generate_uid("photo.png");
        assert_uid_shape(&uid, "photo.png");
    }

    #[test]
    fn test_uid_zero_pads_fields() {
        let time = Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap();
        let uid = generate_uid_at(&time, "a.txt");
        assert!(uid.starts_with("2023/01/02/03/04/05/"));
        assert_uid_shape(&uid, "a.txt");
    }

    #[test]
    fn test_same_second_uids_differ_only_in_token() {
        let time = Utc.with_ymd_and_hms(2024, 6, 30, 23, 59, 59).unwrap();
        let first = generate_uid_at(&time, "photo.png");
        let second = generate_uid_at(&time, "photo.png");

        assert_ne!(first, second);

        let a: Vec<&str> = first.split('/').collect();
        let b: Vec<&str> = second.split('/').collect();
        assert_eq!(a[..6], b[..6]);
        assert_ne!(a[6], b[6]);
        assert_eq!(a[7], b[7]);
    }

    #[test]
    fn test_uids_sort_by_second() {
        let earlier = Utc.with_ymd_and_hms(2024, 9, 30, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 10, 1, 0, 0, 0).unwrap();

        let a = generate_uid_at(&earlier, "zzz");
        let b = generate_uid_at(&later, "aaa");
        assert!(a < b);
    }

    #[test]
    fn test_name_is_kept_verbatim() {
        let uid = generate_uid("nested/dir name.tar.gz");
        assert!(uid.ends_with("/nested/dir name.tar.gz"));
    }
}
