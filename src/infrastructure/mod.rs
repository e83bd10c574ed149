pub mod retailers;
pub mod sqlite;
pub mod storefront;
