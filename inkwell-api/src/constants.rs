//! Constants for the Inkwell API
//!
//! Centralized so transports and services agree on names and defaults.

// ============================================================================
// HEADERS
// ============================================================================

/// Correlation id header attached to every REST response.
pub const REQUEST_ID_HEADER: &str = "request-id";

/// API key header consumed by the auth middleware.
pub const API_KEY_HEADER: &str = "x-api-key";

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Minimum required length for JWT secret keys
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// PAGINATION
// ============================================================================

/// Default page size applied by `query_page_sort`
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Maximum page size applied by `query_page_sort`
pub const MAX_PAGE_SIZE: usize = 100;

// ============================================================================
// DISPATCH
// ============================================================================

/// Default name of the path parameter carrying an entity code
pub const DEFAULT_ID_PARAM: &str = "id";

/// Default capacity of the notification broadcast channel
pub const DEFAULT_WS_CAPACITY: usize = 1000;

/// Default salt for opaque identifiers
pub const DEFAULT_ID_SALT: &str = "inkwell";

/// Root under which every service namespace is mounted
pub const API_ROOT: &str = "/api";
