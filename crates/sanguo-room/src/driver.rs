//! The phase driver: one task per playing room.
//!
//! It waits outside the room lock for whichever comes first: a change
//! to the room, the budget of the current wait point running out, or
//! shutdown. On timeout it asks the room to force the match on. The
//! budget belongs to the wait point, so actions that do not move the
//! match (a deploy move, a card played mid-turn) do not reset it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{self, Instant};
use tracing::debug;

use sanguo_engine::WaitPoint;

use crate::room::Room;

pub(crate) async fn run(room: Arc<Room>, mut shutdown: watch::Receiver<bool>) {
    let room_id = room.id();
    debug!(%room_id, "phase driver started");

    let mut deadline: Option<(WaitPoint, Instant)> = None;
    loop {
        if *shutdown.borrow() {
            break;
        }
        let Some(point) = room.wait_point().await else {
            break;
        };
        let until = match deadline {
            Some((seen, at)) if seen == point => at,
            _ => {
                let at = Instant::now() + room.settings().budget_for(point.phase);
                deadline = Some((point, at));
                at
            }
        };

        tokio::select! {
            _ = room.changed.notified() => {}
            _ = time::sleep_until(until) => room.expire(point).await,
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(%room_id, "phase driver stopped");
}
