//! FIX tag numbers used by the gateway.
//!
//! Only the tags the gateway reads or writes; this is not a dictionary.

#![allow(missing_docs)]

// Framing and header
pub const BEGIN_STRING: u32 = 8;
pub const BODY_LENGTH: u32 = 9;
pub const CHECK_SUM: u32 = 10;
pub const MSG_SEQ_NUM: u32 = 34;
pub const MSG_TYPE: u32 = 35;
pub const SENDER_COMP_ID: u32 = 49;
pub const SENDING_TIME: u32 = 52;
pub const TARGET_COMP_ID: u32 = 56;

// Session administration
pub const ENCRYPT_METHOD: u32 = 98;
pub const HEART_BT_INT: u32 = 108;
pub const TEST_REQ_ID: u32 = 112;
pub const USERNAME: u32 = 553;
pub const PASSWORD: u32 = 554;
pub const REF_SEQ_NUM: u32 = 45;
pub const REF_MSG_TYPE: u32 = 372;
pub const SESSION_REJECT_REASON: u32 = 373;
pub const TEXT: u32 = 58;

// Business rejects
pub const BUSINESS_REJECT_REF_ID: u32 = 379;
pub const BUSINESS_REJECT_REASON: u32 = 380;

// Orders
pub const ACCOUNT: u32 = 1;
pub const AVG_PX: u32 = 6;
pub const CL_ORD_ID: u32 = 11;
pub const CUM_QTY: u32 = 14;
pub const EXEC_ID: u32 = 17;
pub const LAST_PX: u32 = 31;
pub const LAST_QTY: u32 = 32;
pub const ORDER_ID: u32 = 37;
pub const ORDER_QTY: u32 = 38;
pub const ORD_STATUS: u32 = 39;
pub const ORD_TYPE: u32 = 40;
pub const ORIG_CL_ORD_ID: u32 = 41;
pub const PRICE: u32 = 44;
pub const SIDE: u32 = 54;
pub const SYMBOL: u32 = 55;
pub const TIME_IN_FORCE: u32 = 59;
pub const TRANSACT_TIME: u32 = 60;
pub const CXL_REJ_RESPONSE_TO: u32 = 434;
pub const EXEC_TYPE: u32 = 150;
pub const LEAVES_QTY: u32 = 151;
pub const SECURITY_EXCHANGE: u32 = 207;

// Market data
pub const NO_RELATED_SYM: u32 = 146;
pub const MD_REQ_ID: u32 = 262;
pub const SUBSCRIPTION_REQUEST_TYPE: u32 = 263;
pub const MARKET_DEPTH: u32 = 264;
pub const MD_UPDATE_TYPE: u32 = 265;
pub const AGGREGATED_BOOK: u32 = 266;
pub const NO_MD_ENTRY_TYPES: u32 = 267;
pub const NO_MD_ENTRIES: u32 = 268;
pub const MD_ENTRY_TYPE: u32 = 269;
pub const MD_ENTRY_PX: u32 = 270;
pub const MD_ENTRY_SIZE: u32 = 271;
pub const MD_UPDATE_ACTION: u32 = 279;

// Mass cancel
pub const MASS_CANCEL_REQUEST_TYPE: u32 = 530;
pub const MASS_CANCEL_RESPONSE: u32 = 531;
pub const TOTAL_AFFECTED_ORDERS: u32 = 533;

// Mass status
pub const MASS_STATUS_REQ_ID: u32 = 584;
pub const MASS_STATUS_REQ_TYPE: u32 = 585;
pub const LAST_RPT_REQUESTED: u32 = 912;

// Positions
pub const ACCOUNT_TYPE: u32 = 581;
pub const NO_POSITIONS: u32 = 702;
pub const POS_TYPE: u32 = 703;
pub const LONG_QTY: u32 = 704;
pub const SHORT_QTY: u32 = 705;
pub const POS_REQ_ID: u32 = 710;
pub const POS_MAINT_RPT_ID: u32 = 721;
pub const POS_REQ_TYPE: u32 = 724;
pub const TOTAL_NUM_POS_REPORTS: u32 = 727;
pub const POS_REQ_RESULT: u32 = 728;
