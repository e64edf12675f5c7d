//! ActiveSync WBXML code page tokens and enumerated values.

use super::wbxml::{tag, Tag};

/// Code page 0.
pub mod air_sync {
    use super::*;

    const PAGE: u8 = 0;

    pub const SYNC: Tag = tag(PAGE, 0x05);
    pub const ADD: Tag = tag(PAGE, 0x07);
    pub const CHANGE: Tag = tag(PAGE, 0x08);
    pub const DELETE: Tag = tag(PAGE, 0x09);
    pub const SYNC_KEY: Tag = tag(PAGE, 0x0B);
    pub const SERVER_ID: Tag = tag(PAGE, 0x0D);
    pub const STATUS: Tag = tag(PAGE, 0x0E);
    pub const COLLECTION: Tag = tag(PAGE, 0x0F);
    pub const CLASS: Tag = tag(PAGE, 0x10);
    pub const COLLECTION_ID: Tag = tag(PAGE, 0x12);
    pub const GET_CHANGES: Tag = tag(PAGE, 0x13);
    pub const MORE_AVAILABLE: Tag = tag(PAGE, 0x14);
    pub const COMMANDS: Tag = tag(PAGE, 0x16);
    pub const OPTIONS: Tag = tag(PAGE, 0x17);
    pub const FILTER_TYPE: Tag = tag(PAGE, 0x18);
    pub const TRUNCATION: Tag = tag(PAGE, 0x19);
    pub const COLLECTIONS: Tag = tag(PAGE, 0x1C);
    pub const APPLICATION_DATA: Tag = tag(PAGE, 0x1D);
    pub const SOFT_DELETE: Tag = tag(PAGE, 0x21);
    pub const MIME_SUPPORT: Tag = tag(PAGE, 0x22);
    pub const MIME_TRUNCATION: Tag = tag(PAGE, 0x23);

    pub mod status {
        pub const SUCCESS: &str = "1";
        pub const INVALID_SYNC_KEY: &str = "3";
    }

    pub mod mime_support {
        pub const NEVER: &str = "0";
    }

    pub mod mime_truncation {
        pub const TRUNCATE_ALL: &str = "0";
    }

    /// How far back a folder is synchronized.
    pub mod filter_type {
        pub const NO_FILTER: &str = "0";
        pub const ONE_DAY_BACK: &str = "1";
        pub const THREE_DAYS_BACK: &str = "2";
        pub const ONE_WEEK_BACK: &str = "3";
        pub const TWO_WEEKS_BACK: &str = "4";
        pub const ONE_MONTH_BACK: &str = "5";
        pub const THREE_MONTHS_BACK: &str = "6";
        pub const SIX_MONTHS_BACK: &str = "7";
        pub const INCOMPLETE_TASKS: &str = "8";
    }
}

/// Code page 2.
pub mod email {
    use super::*;

    const PAGE: u8 = 2;

    pub const ATTACHMENT: Tag = tag(PAGE, 0x05);
    pub const ATTACHMENTS: Tag = tag(PAGE, 0x06);
    pub const ATT_NAME: Tag = tag(PAGE, 0x07);
    pub const ATT_SIZE: Tag = tag(PAGE, 0x08);
    pub const ATT0_ID: Tag = tag(PAGE, 0x09);
    pub const BODY_SIZE: Tag = tag(PAGE, 0x0D);
    pub const DATE_RECEIVED: Tag = tag(PAGE, 0x0F);
    pub const DISPLAY_NAME: Tag = tag(PAGE, 0x10);
    pub const SUBJECT: Tag = tag(PAGE, 0x14);
    pub const READ: Tag = tag(PAGE, 0x15);
    pub const TO: Tag = tag(PAGE, 0x16);
    pub const CC: Tag = tag(PAGE, 0x17);
    pub const FROM: Tag = tag(PAGE, 0x18);
    pub const REPLY_TO: Tag = tag(PAGE, 0x19);
    pub const FLAG: Tag = tag(PAGE, 0x3A);
    /// `Status` inside `Flag`.
    pub const FLAG_STATUS: Tag = tag(PAGE, 0x3B);
}

/// Code page 17.
pub mod air_sync_base {
    use super::*;

    const PAGE: u8 = 17;

    pub const TYPE: Tag = tag(PAGE, 0x06);
    pub const BODY: Tag = tag(PAGE, 0x0A);
    pub const ESTIMATED_DATA_SIZE: Tag = tag(PAGE, 0x0C);
    pub const ATTACHMENTS: Tag = tag(PAGE, 0x0E);
    pub const ATTACHMENT: Tag = tag(PAGE, 0x0F);
    pub const DISPLAY_NAME: Tag = tag(PAGE, 0x10);
    pub const FILE_REFERENCE: Tag = tag(PAGE, 0x11);
    pub const CONTENT_ID: Tag = tag(PAGE, 0x13);
    pub const IS_INLINE: Tag = tag(PAGE, 0x15);

    pub mod body_type {
        pub const PLAIN_TEXT: &str = "1";
        pub const HTML: &str = "2";
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pages_do_not_collide() {
        assert_eq!(air_sync::SYNC, 0x0005);
        assert_eq!(email::FLAG, 0x023A);
        assert_eq!(air_sync_base::BODY, 0x110A);
        assert_ne!(email::ATTACHMENTS, air_sync_base::ATTACHMENTS);
        assert_ne!(email::DISPLAY_NAME, air_sync_base::DISPLAY_NAME);
    }
}
