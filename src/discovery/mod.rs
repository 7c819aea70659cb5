//! Recipe discovery: sitemaps, listing pages and bounded source crawls.

mod crawl;
mod links;
mod sitemap;

pub use crawl::{crawl_source, Counts, CrawlOptions, CrawlResult};
pub use links::discover_recipe_links;
pub use sitemap::{
    discover_sitemap_links, looks_like_sitemap, recipe_links_from_sitemap, sitemap_locs,
};
