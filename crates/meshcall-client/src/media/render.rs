use meshcall_protocol::ParticipantId;

use super::RemoteStream;

/// Presentation surface for remote participants
pub trait Renderer: Send + Sync {
    /// Show `stream` for `peer`, called once when the link is created
    fn render_remote_stream(&self, peer: &ParticipantId, stream: RemoteStream);

    fn remove_rendered_stream(&self, peer: &ParticipantId);

    /// `participants` counts the local participant as well
    fn recompute_layout(&self, participants: usize);
}
