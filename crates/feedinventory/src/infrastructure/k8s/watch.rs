use error_stack::Report;
use futures::Stream;
use futures::StreamExt;
use kube::runtime::watcher;
use kube::Resource;
use tokio::select;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::types::KubernetesError;

/// Consumes a watch stream until `token` is cancelled.
///
/// `synced` flips to true on the first full listing. Stream errors are logged;
/// the stream itself backs off and re-lists.
#[tracing::instrument(skip_all, fields(kind = %K::kind(&())))]
pub(crate) async fn run_watch<K, S, F>(
    mut stream: S,
    synced: Option<watch::Sender<bool>>,
    mut on_event: F,
    token: CancellationToken,
) where
    K: Resource<DynamicType = ()>,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Unpin,
    F: FnMut(watcher::Event<K>),
{
    info!("Starting watch");

    loop {
        select! {
            _ = token.cancelled() => {
                info!("Watch shutdown requested");
                break;
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    if let watcher::Event::Restarted(objects) = &event {
                        debug!(objects = objects.len(), "Watch (re)listed");
                        if let Some(synced) = &synced {
                            synced.send_replace(true);
                        }
                    }
                    on_event(event);
                }
                Some(Err(e)) => {
                    let report = Report::new(e).change_context(KubernetesError::WatchFailed {
                        kind: K::kind(&()).to_string(),
                        message: "watch stream error".to_string(),
                    });
                    warn!("{report:?}");
                }
                None => {
                    warn!("Watch stream ended unexpectedly");
                    break;
                }
            }
        }
    }
}
