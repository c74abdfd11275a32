pub mod db_utils;
pub mod identity_filter;
