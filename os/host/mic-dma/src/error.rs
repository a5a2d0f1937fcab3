use mic_layout::TranslateError;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DmaError {
    #[error("DMA channel has no ring")]
    ChannelNotReady,
    #[error("DMA ring full: {needed} descriptors needed, {available} free")]
    RingFull { needed: usize, available: usize },
    #[error("no DMA channel {0}")]
    NoSuchChannel(usize),
    #[error(transparent)]
    Translate(#[from] TranslateError),
}
