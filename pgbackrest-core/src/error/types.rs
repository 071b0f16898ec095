//LICENSE Portions Copyright 2019-2021 ZomboDB, LLC.
//LICENSE
//LICENSE Portions Copyright 2021-2023 Technology Concepts & Design, Inc.
//LICENSE
//LICENSE Portions Copyright 2023-2023 PgCentral Foundation, Inc. <contact@pgcentral.org>
//LICENSE
//LICENSE All rights reserved.
//LICENSE
//LICENSE Use of this source code is governed by the MIT license that can be found in the LICENSE file.
//! The closed `ErrorType` manifest.
//!
//! Reproduced byte-for-byte (code, name, fatal flag, parent) from
//! `examples/original_source/src/common/error.auto.c` in the retrieval pack this crate
//! was built from. The root, `RuntimeError`, is its own parent -- `extends()` walks
//! ancestors until it finds a type whose parent is itself.

use std::fmt;

/// An entry in the closed error-type tree.
///
/// Two types are fatal: [`ASSERT_ERROR`] and [`MEMORY_ERROR`]. Every other type is
/// ordinary and can be caught with [`crate::error::PgTryBuilder::catch_when`] or
/// [`crate::error::PgTryBuilder::catch_others`].
pub struct ErrorType {
    pub code: i32,
    pub name: &'static str,
    pub parent: &'static ErrorType,
    pub fatal: bool,
}

impl ErrorType {
    /// True if `self` is `ancestor` or a proper descendant of it.
    pub fn is_a(&'static self, ancestor: &'static ErrorType) -> bool {
        std::ptr::eq(self, ancestor) || self.extends(ancestor)
    }

    /// True if `ancestor` is a proper ancestor of `self` (not `self` itself).
    pub fn extends(&'static self, ancestor: &'static ErrorType) -> bool {
        let mut current = self;
        while !std::ptr::eq(current, current.parent) {
            if std::ptr::eq(current.parent, ancestor) {
                return true;
            }
            current = current.parent;
        }
        false
    }

    /// Look up a type by its globally unique code.
    pub fn by_code(code: i32) -> Option<&'static ErrorType> {
        ALL.iter().copied().find(|t| t.code == code)
    }

    /// Look up a type by its globally unique name.
    pub fn by_name(name: &str) -> Option<&'static ErrorType> {
        ALL.iter().copied().find(|t| t.name == name)
    }
}

impl fmt::Debug for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorType")
            .field("code", &self.code)
            .field("name", &self.name)
            .field("fatal", &self.fatal)
            .finish()
    }
}

impl PartialEq for ErrorType {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for ErrorType {}

macro_rules! error_types {
    ($( $konst:ident, $code:literal, $name:literal, $fatal:literal, $parent:ident; )*) => {
        $(
            pub static $konst: ErrorType = ErrorType {
                code: $code,
                name: $name,
                fatal: $fatal,
                parent: &$parent,
            };
        )*

        /// Every type in the manifest, in declaration order -- mirrors the C
        /// `errorTypeList[]` sentinel-terminated array, minus the sentinel.
        pub static ALL: &[&ErrorType] = &[ $( &$konst, )* ];
    };
}

error_types! {
    ASSERT_ERROR, 25, "AssertError", true, RUNTIME_ERROR;
    CHECKSUM_ERROR, 26, "ChecksumError", false, RUNTIME_ERROR;
    CONFIG_ERROR, 27, "ConfigError", false, RUNTIME_ERROR;
    FILE_INVALID_ERROR, 28, "FileInvalidError", false, RUNTIME_ERROR;
    FORMAT_ERROR, 29, "FormatError", false, RUNTIME_ERROR;
    COMMAND_REQUIRED_ERROR, 30, "CommandRequiredError", false, RUNTIME_ERROR;
    OPTION_INVALID_ERROR, 31, "OptionInvalidError", false, RUNTIME_ERROR;
    OPTION_INVALID_VALUE_ERROR, 32, "OptionInvalidValueError", false, RUNTIME_ERROR;
    OPTION_INVALID_RANGE_ERROR, 33, "OptionInvalidRangeError", false, RUNTIME_ERROR;
    OPTION_INVALID_PAIR_ERROR, 34, "OptionInvalidPairError", false, RUNTIME_ERROR;
    OPTION_DUPLICATE_KEY_ERROR, 35, "OptionDuplicateKeyError", false, RUNTIME_ERROR;
    OPTION_NEGATE_ERROR, 36, "OptionNegateError", false, RUNTIME_ERROR;
    OPTION_REQUIRED_ERROR, 37, "OptionRequiredError", false, RUNTIME_ERROR;
    PG_RUNNING_ERROR, 38, "PgRunningError", false, RUNTIME_ERROR;
    PROTOCOL_ERROR, 39, "ProtocolError", false, RUNTIME_ERROR;
    PATH_NOT_EMPTY_ERROR, 40, "PathNotEmptyError", false, RUNTIME_ERROR;
    FILE_OPEN_ERROR, 41, "FileOpenError", false, RUNTIME_ERROR;
    FILE_READ_ERROR, 42, "FileReadError", false, RUNTIME_ERROR;
    PARAM_REQUIRED_ERROR, 43, "ParamRequiredError", false, RUNTIME_ERROR;
    ARCHIVE_MISMATCH_ERROR, 44, "ArchiveMismatchError", false, RUNTIME_ERROR;
    ARCHIVE_DUPLICATE_ERROR, 45, "ArchiveDuplicateError", false, RUNTIME_ERROR;
    VERSION_NOT_SUPPORTED_ERROR, 46, "VersionNotSupportedError", false, RUNTIME_ERROR;
    PATH_CREATE_ERROR, 47, "PathCreateError", false, RUNTIME_ERROR;
    COMMAND_INVALID_ERROR, 48, "CommandInvalidError", false, RUNTIME_ERROR;
    HOST_CONNECT_ERROR, 49, "HostConnectError", false, RUNTIME_ERROR;
    LOCK_ACQUIRE_ERROR, 50, "LockAcquireError", false, RUNTIME_ERROR;
    BACKUP_MISMATCH_ERROR, 51, "BackupMismatchError", false, RUNTIME_ERROR;
    FILE_SYNC_ERROR, 52, "FileSyncError", false, RUNTIME_ERROR;
    PATH_OPEN_ERROR, 53, "PathOpenError", false, RUNTIME_ERROR;
    PATH_SYNC_ERROR, 54, "PathSyncError", false, RUNTIME_ERROR;
    FILE_MISSING_ERROR, 55, "FileMissingError", false, RUNTIME_ERROR;
    DB_CONNECT_ERROR, 56, "DbConnectError", false, RUNTIME_ERROR;
    DB_QUERY_ERROR, 57, "DbQueryError", false, RUNTIME_ERROR;
    DB_MISMATCH_ERROR, 58, "DbMismatchError", false, RUNTIME_ERROR;
    DB_TIMEOUT_ERROR, 59, "DbTimeoutError", false, RUNTIME_ERROR;
    FILE_REMOVE_ERROR, 60, "FileRemoveError", false, RUNTIME_ERROR;
    PATH_REMOVE_ERROR, 61, "PathRemoveError", false, RUNTIME_ERROR;
    STOP_ERROR, 62, "StopError", false, RUNTIME_ERROR;
    TERM_ERROR, 63, "TermError", false, RUNTIME_ERROR;
    FILE_WRITE_ERROR, 64, "FileWriteError", false, RUNTIME_ERROR;
    PROTOCOL_TIMEOUT_ERROR, 66, "ProtocolTimeoutError", false, RUNTIME_ERROR;
    FEATURE_NOT_SUPPORTED_ERROR, 67, "FeatureNotSupportedError", false, RUNTIME_ERROR;
    ARCHIVE_COMMAND_INVALID_ERROR, 68, "ArchiveCommandInvalidError", false, RUNTIME_ERROR;
    LINK_EXPECTED_ERROR, 69, "LinkExpectedError", false, RUNTIME_ERROR;
    LINK_DESTINATION_ERROR, 70, "LinkDestinationError", false, RUNTIME_ERROR;
    HOST_INVALID_ERROR, 72, "HostInvalidError", false, RUNTIME_ERROR;
    PATH_MISSING_ERROR, 73, "PathMissingError", false, RUNTIME_ERROR;
    FILE_MOVE_ERROR, 74, "FileMoveError", false, RUNTIME_ERROR;
    BACKUP_SET_INVALID_ERROR, 75, "BackupSetInvalidError", false, RUNTIME_ERROR;
    TABLESPACE_MAP_ERROR, 76, "TablespaceMapError", false, RUNTIME_ERROR;
    PATH_TYPE_ERROR, 77, "PathTypeError", false, RUNTIME_ERROR;
    LINK_MAP_ERROR, 78, "LinkMapError", false, RUNTIME_ERROR;
    FILE_CLOSE_ERROR, 79, "FileCloseError", false, RUNTIME_ERROR;
    DB_MISSING_ERROR, 80, "DbMissingError", false, RUNTIME_ERROR;
    DB_INVALID_ERROR, 81, "DbInvalidError", false, RUNTIME_ERROR;
    ARCHIVE_TIMEOUT_ERROR, 82, "ArchiveTimeoutError", false, RUNTIME_ERROR;
    FILE_MODE_ERROR, 83, "FileModeError", false, RUNTIME_ERROR;
    OPTION_MULTIPLE_VALUE_ERROR, 84, "OptionMultipleValueError", false, RUNTIME_ERROR;
    PROTOCOL_OUTPUT_REQUIRED_ERROR, 85, "ProtocolOutputRequiredError", false, RUNTIME_ERROR;
    LINK_OPEN_ERROR, 86, "LinkOpenError", false, RUNTIME_ERROR;
    ARCHIVE_DISABLED_ERROR, 87, "ArchiveDisabledError", false, RUNTIME_ERROR;
    FILE_OWNER_ERROR, 88, "FileOwnerError", false, RUNTIME_ERROR;
    USER_MISSING_ERROR, 89, "UserMissingError", false, RUNTIME_ERROR;
    OPTION_COMMAND_ERROR, 90, "OptionCommandError", false, RUNTIME_ERROR;
    GROUP_MISSING_ERROR, 91, "GroupMissingError", false, RUNTIME_ERROR;
    PATH_EXISTS_ERROR, 92, "PathExistsError", false, RUNTIME_ERROR;
    FILE_EXISTS_ERROR, 93, "FileExistsError", false, RUNTIME_ERROR;
    MEMORY_ERROR, 94, "MemoryError", true, RUNTIME_ERROR;
    CRYPTO_ERROR, 95, "CryptoError", false, RUNTIME_ERROR;
    PARAM_INVALID_ERROR, 96, "ParamInvalidError", false, RUNTIME_ERROR;
    PATH_CLOSE_ERROR, 97, "PathCloseError", false, RUNTIME_ERROR;
    FILE_INFO_ERROR, 98, "FileInfoError", false, RUNTIME_ERROR;
    JSON_FORMAT_ERROR, 99, "JsonFormatError", false, RUNTIME_ERROR;
    KERNEL_ERROR, 100, "KernelError", false, RUNTIME_ERROR;
    SERVICE_ERROR, 101, "ServiceError", false, RUNTIME_ERROR;
    EXECUTE_ERROR, 102, "ExecuteError", false, RUNTIME_ERROR;
    REPO_INVALID_ERROR, 103, "RepoInvalidError", false, RUNTIME_ERROR;
    COMMAND_ERROR, 104, "CommandError", false, RUNTIME_ERROR;
    ACCESS_ERROR, 105, "AccessError", false, RUNTIME_ERROR;
    CLOCK_ERROR, 106, "ClockError", false, RUNTIME_ERROR;
    RUNTIME_ERROR, 122, "RuntimeError", false, RUNTIME_ERROR;
    INVALID_ERROR, 123, "InvalidError", false, RUNTIME_ERROR;
    UNHANDLED_ERROR, 124, "UnhandledError", false, RUNTIME_ERROR;
    UNKNOWN_ERROR, 125, "UnknownError", false, RUNTIME_ERROR;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_its_own_parent() {
        assert!(std::ptr::eq(RUNTIME_ERROR.parent, &RUNTIME_ERROR));
    }

    #[test]
    fn every_type_reaches_the_root() {
        for t in ALL {
            assert!(t.is_a(&RUNTIME_ERROR), "{} does not descend from RuntimeError", t.name);
        }
    }

    #[test]
    fn codes_and_names_are_unique() {
        let mut codes: Vec<i32> = ALL.iter().map(|t| t.code).collect();
        let mut names: Vec<&str> = ALL.iter().map(|t| t.name).collect();
        codes.sort_unstable();
        names.sort_unstable();
        let mut codes_dedup = codes.clone();
        codes_dedup.dedup();
        let mut names_dedup = names.clone();
        names_dedup.dedup();
        assert_eq!(codes.len(), codes_dedup.len(), "duplicate error code");
        assert_eq!(names.len(), names_dedup.len(), "duplicate error name");
    }

    #[test]
    fn exactly_two_fatal_types() {
        let fatal: Vec<_> = ALL.iter().filter(|t| t.fatal).map(|t| t.name).collect();
        assert_eq!(fatal, vec!["AssertError", "MemoryError"]);
    }

    #[test]
    fn format_error_is_a_runtime_error_but_not_fatal() {
        assert!(FORMAT_ERROR.is_a(&RUNTIME_ERROR));
        assert!(!FORMAT_ERROR.fatal);
    }

    #[test]
    fn by_code_and_by_name_round_trip() {
        let t = ErrorType::by_code(29).unwrap();
        assert_eq!(t.name, "FormatError");
        assert!(std::ptr::eq(t, &FORMAT_ERROR));
        assert!(std::ptr::eq(ErrorType::by_name("KernelError").unwrap(), &KERNEL_ERROR));
        assert!(ErrorType::by_code(9999).is_none());
    }
}
