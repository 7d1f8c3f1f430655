use super::feed_content::FeedContentAggregator;
use super::full_website::FullWebsiteAggregator;
use super::mein_mmo::MeinMmoAggregator;
use super::podcast::PodcastAggregator;
use super::reddit::RedditAggregator;
use super::sites::{
    SiteAggregator, CASCHYS_BLOG, DARK_LEGACY, EXPLOSM, HEISE, MACTECHNEWS, MERKUR, OGLAF,
    TAGESSCHAU,
};
use super::youtube::YoutubeAggregator;
use super::SourceAggregator;
use crate::types::FeedKind;
use std::sync::Arc;

/// Kind tag → plugin constructor. The single place new kinds register.
pub fn create(kind: FeedKind) -> Arc<dyn SourceAggregator> {
    match kind {
        FeedKind::FullWebsite => Arc::new(FullWebsiteAggregator),
        FeedKind::FeedContent => Arc::new(FeedContentAggregator),
        FeedKind::Youtube => Arc::new(YoutubeAggregator),
        FeedKind::Reddit => Arc::new(RedditAggregator),
        FeedKind::Podcast => Arc::new(PodcastAggregator),
        FeedKind::MeinMmo => Arc::new(MeinMmoAggregator),
        FeedKind::Heise => Arc::new(SiteAggregator::new(&HEISE)),
        FeedKind::Merkur => Arc::new(SiteAggregator::new(&MERKUR)),
        FeedKind::Tagesschau => Arc::new(SiteAggregator::new(&TAGESSCHAU)),
        FeedKind::Explosm => Arc::new(SiteAggregator::new(&EXPLOSM)),
        FeedKind::DarkLegacy => Arc::new(SiteAggregator::new(&DARK_LEGACY)),
        FeedKind::Oglaf => Arc::new(SiteAggregator::new(&OGLAF)),
        FeedKind::CaschysBlog => Arc::new(SiteAggregator::new(&CASCHYS_BLOG)),
        FeedKind::Mactechnews => Arc::new(SiteAggregator::new(&MACTECHNEWS)),
    }
}
