pub mod ai;
pub mod books;
pub mod jobs;
pub mod scrape;
pub mod sites;
pub mod upload;
pub mod workflow;
