//! Business error codes the helpers on [`crate::ArrayClient`] treat as
//! benign.

use arraylink_types::ErrorCode;

pub const VOLUME_NOT_FOUND: ErrorCode = ErrorCode::new(100_601);
pub const SNAPSHOT_NOT_FOUND: ErrorCode = ErrorCode::new(100_701);

/// The LUN is already mapped into some client group.
pub const LUN_ALREADY_MAPPED: ErrorCode = ErrorCode::new(200_301);

/// The LUN is not mapped into the client group.
pub const LUN_ALREADY_UNMAPPED: ErrorCode = ErrorCode::new(200_302);

/// Generic blacklist failure; "Black list not exist" is one of its messages.
pub const BLACKLIST_OPERATION_FAILED: ErrorCode = ErrorCode::new(200_502);
