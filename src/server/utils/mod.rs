pub mod encoding_utils;
pub mod extraction_utils;
pub mod manifest_utils;
pub mod proxy_url_utils;
