pub mod storage_path;
pub mod url;
