use crate::session::StreamHandle;

/// Binds a media stream to a render target. Given no stream it shows a
/// placeholder; there is no retry and no validation beyond the null-check.
#[derive(Debug, Default)]
pub struct VideoSurface {
    stream: Option<StreamHandle>,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&mut self, stream: Option<StreamHandle>) {
        self.stream = stream;
    }

    pub fn stream(&self) -> Option<StreamHandle> {
        self.stream
    }

    pub fn is_placeholder(&self) -> bool {
        self.stream.is_none()
    }
}
