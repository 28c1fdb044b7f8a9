mod channel_scale;
mod relu;
mod roi_pool;

pub use channel_scale::ChannelScale;
pub use relu::Relu;
pub use roi_pool::RoiPool;
