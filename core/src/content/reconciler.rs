use crate::interface::FollowUpReceipt;
use crate::tour::{ContentNugget, Waypoint, WaypointId};
use log::{debug, warn};

/// Polling continues while any waypoint has no content yet or holds an
/// unready nugget.
pub fn needs_polling(waypoints: &[Waypoint]) -> bool {
    waypoints.iter().any(|waypoint| !waypoint.content_complete())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub matched: usize,
    pub added: usize,
    pub unmatched_local: usize,
    pub pending_kept: usize,
}

/// Folds backend waypoints into the local list.
///
/// Local order, ids and `visited` flags are kept. Content comes from the
/// backend, except follow-up placeholders the backend does not know about
/// yet. Backend waypoints with no local counterpart are appended.
pub fn merge_remote(
    local: &mut Vec<Waypoint>,
    remote: Vec<Waypoint>,
    epsilon_deg: f64,
) -> MergeReport {
    let mut report = MergeReport::default();
    let mut remote: Vec<Option<Waypoint>> = remote.into_iter().map(Some).collect();

    for waypoint in local.iter_mut() {
        let slot = remote.iter_mut().find(|slot| {
            slot.as_ref()
                .map(|candidate| waypoint.matches(candidate, epsilon_deg))
                .unwrap_or(false)
        });
        match slot.and_then(Option::take) {
            Some(found) => {
                report.pending_kept += merge_content(waypoint, found.content);
                report.matched += 1;
            }
            None => {
                debug!("no backend match for waypoint {}", waypoint.name);
                report.unmatched_local += 1;
            }
        }
    }

    for mut extra in remote.into_iter().flatten() {
        extra.visited = false;
        warn!("backend returned unknown waypoint {}", extra.name);
        local.push(extra);
        report.added += 1;
    }
    report
}

/// Replaces local content with the backend's, keeping the placeholders the
/// backend has not caught up with. Each backend nugget stands in for at most
/// one placeholder; newer placeholders are matched first.
fn merge_content(local: &mut Waypoint, remote_content: Vec<ContentNugget>) -> usize {
    let placeholders: Vec<ContentNugget> = local
        .content
        .drain(..)
        .filter(|nugget| !nugget.ready && nugget.question.is_some())
        .collect();

    let mut claimed = vec![false; remote_content.len()];
    let mut resolved = vec![false; placeholders.len()];
    for (slot, placeholder) in placeholders.iter().enumerate().rev() {
        if let Some(index) = find_resolution(&remote_content, &claimed, placeholder) {
            claimed[index] = true;
            resolved[slot] = true;
        }
    }

    local.content = remote_content;
    let mut kept = 0;
    for (placeholder, resolved) in placeholders.into_iter().zip(resolved) {
        if !resolved {
            local.content.push(placeholder);
            kept += 1;
        }
    }
    kept
}

/// Backend nugget that replaces `placeholder`: the one with its id, or before
/// an id exists, the newest unready nugget asking the same question.
fn find_resolution(
    content: &[ContentNugget],
    claimed: &[bool],
    placeholder: &ContentNugget,
) -> Option<usize> {
    let free = |index: &usize| !claimed[*index];
    if placeholder.id.is_empty() {
        (0..content.len()).rev().filter(free).find(|&index| {
            let nugget = &content[index];
            !nugget.ready && nugget.question == placeholder.question
        })
    } else {
        (0..content.len())
            .filter(free)
            .find(|&index| content[index].id == placeholder.id)
    }
}

/// A follow-up question waiting for the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpRequest {
    pub tour_id: String,
    pub waypoint_id: WaypointId,
    pub waypoint_name: String,
    pub question: String,
}

/// Appends the backend's acknowledgement of a follow-up to the waypoint: the
/// answered nugget if it came back ready, otherwise a placeholder.
pub fn append_follow_up(waypoint: &mut Waypoint, question: &str, receipt: &FollowUpReceipt) {
    let nugget = match &receipt.nugget {
        Some(nugget) if nugget.ready => nugget.clone(),
        _ => ContentNugget::pending_follow_up(receipt.resolved_id().unwrap_or_default(), question),
    };
    waypoint.content.push(nugget);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready(id: &str) -> ContentNugget {
        ContentNugget {
            id: id.into(),
            audio_path: Some(format!("audio/{id}.mp3")),
            ready: true,
            ..Default::default()
        }
    }

    fn with_content(name: &str, lat: f64, lng: f64, content: Vec<ContentNugget>) -> Waypoint {
        let mut waypoint = Waypoint::new(name, lat, lng);
        waypoint.content = content;
        waypoint
    }

    #[test]
    fn polling_needed_until_every_waypoint_is_ready() {
        let mut waypoints = vec![
            with_content("A", 0.0, 0.0, vec![ready("a")]),
            with_content("B", 0.0, 1.0, vec![]),
        ];
        assert!(needs_polling(&waypoints));
        waypoints[1].content.push(ContentNugget::default());
        assert!(needs_polling(&waypoints));
        waypoints[1].content[0].ready = true;
        assert!(!needs_polling(&waypoints));
        assert!(!needs_polling(&[]));
    }

    #[test]
    fn backend_content_wins_but_visited_stays_local() {
        let mut local = vec![with_content("A", 32.0, 34.0, vec![])];
        local[0].visited = true;
        let local_id = local[0].id;
        let remote = vec![with_content("A", 32.00002, 34.00003, vec![ready("main")])];

        let report = merge_remote(&mut local, remote, 1e-4);
        assert_eq!(report.matched, 1);
        assert!(local[0].visited);
        assert_eq!(local[0].id, local_id);
        assert_eq!(local[0].content, vec![ready("main")]);
    }

    #[test]
    fn local_order_is_preserved() {
        let mut local = vec![
            Waypoint::new("A", 0.0, 0.0),
            Waypoint::new("B", 0.0, 1.0),
        ];
        let remote = vec![
            with_content("B", 0.0, 1.0, vec![ready("b")]),
            with_content("A", 0.0, 0.0, vec![ready("a")]),
        ];
        merge_remote(&mut local, remote, 1e-4);
        assert_eq!(local[0].name, "A");
        assert_eq!(local[0].content[0].id, "a");
        assert_eq!(local[1].content[0].id, "b");
    }

    #[test]
    fn unknown_backend_waypoints_are_appended_unvisited() {
        let mut local = vec![Waypoint::new("A", 0.0, 0.0)];
        let mut extra = Waypoint::new("New", 1.0, 1.0);
        extra.visited = true;
        let report = merge_remote(&mut local, vec![extra], 1e-4);
        assert_eq!(report.added, 1);
        assert_eq!(report.unmatched_local, 1);
        assert_eq!(local.len(), 2);
        assert!(!local[1].visited);
    }

    #[test]
    fn pending_follow_up_survives_until_backend_knows_it() {
        let mut local = vec![with_content("A", 0.0, 0.0, vec![ready("main")])];
        local[0]
            .content
            .push(ContentNugget::pending_follow_up("q-7", "How old is it?"));

        let report = merge_remote(
            &mut local,
            vec![with_content("A", 0.0, 0.0, vec![ready("main")])],
            1e-4,
        );
        assert_eq!(report.pending_kept, 1);
        assert_eq!(local[0].content.len(), 2);
        assert!(!local[0].content[1].ready);

        let mut answered = ready("q-7");
        answered.question = Some("How old is it?".into());
        answered.answer = Some("Four hundred years.".into());
        merge_remote(
            &mut local,
            vec![with_content("A", 0.0, 0.0, vec![ready("main"), answered.clone()])],
            1e-4,
        );
        assert_eq!(local[0].content, vec![ready("main"), answered]);
        assert!(!needs_polling(&local));
    }

    #[test]
    fn placeholder_without_id_is_matched_by_question() {
        let mut local = vec![with_content("A", 0.0, 0.0, vec![ready("main")])];
        local[0]
            .content
            .push(ContentNugget::pending_follow_up("", "Who lived here?"));

        let mut server_pending = ContentNugget::pending_follow_up("srv-1", "Who lived here?");
        server_pending.ready = false;
        merge_remote(
            &mut local,
            vec![with_content(
                "A",
                0.0,
                0.0,
                vec![ready("main"), server_pending.clone()],
            )],
            1e-4,
        );
        assert_eq!(local[0].content, vec![ready("main"), server_pending]);
    }

    #[test]
    fn repeated_question_without_id_waits_for_its_own_answer() {
        let mut earlier = ready("srv-1");
        earlier.question = Some("Who built this?".into());
        earlier.answer = Some("The guild.".into());
        let mut local = vec![with_content(
            "A",
            0.0,
            0.0,
            vec![ready("main"), earlier.clone()],
        )];
        local[0]
            .content
            .push(ContentNugget::pending_follow_up("", "Who built this?"));

        let report = merge_remote(
            &mut local,
            vec![with_content("A", 0.0, 0.0, vec![ready("main"), earlier.clone()])],
            1e-4,
        );
        assert_eq!(report.pending_kept, 1);
        assert_eq!(local[0].content.len(), 3);
        assert!(!local[0].content[2].ready);
        assert!(needs_polling(&local));
    }

    #[test]
    fn backend_nugget_resolves_one_placeholder_only() {
        let mut local = vec![with_content("A", 0.0, 0.0, vec![ready("main")])];
        local[0]
            .content
            .push(ContentNugget::pending_follow_up("", "Why red?"));
        local[0]
            .content
            .push(ContentNugget::pending_follow_up("", "Why red?"));

        let server_pending = ContentNugget::pending_follow_up("srv-2", "Why red?");
        let report = merge_remote(
            &mut local,
            vec![with_content(
                "A",
                0.0,
                0.0,
                vec![ready("main"), server_pending.clone()],
            )],
            1e-4,
        );
        assert_eq!(report.pending_kept, 1);
        assert_eq!(local[0].content.len(), 3);
        assert_eq!(local[0].content[1], server_pending);
        assert_eq!(local[0].content[2].id, "");
    }

    #[test]
    fn receipt_produces_placeholder_or_answer() {
        let mut waypoint = with_content("A", 0.0, 0.0, vec![ready("main")]);
        let receipt = FollowUpReceipt {
            nugget: None,
            nugget_id: Some("q-1".into()),
        };
        append_follow_up(&mut waypoint, "Why red?", &receipt);
        let placeholder = &waypoint.content[1];
        assert_eq!(placeholder.id, "q-1");
        assert_eq!(placeholder.question.as_deref(), Some("Why red?"));
        assert!(!placeholder.ready);
        assert!(placeholder.answer.is_none());

        let mut answer = ready("q-2");
        answer.question = Some("Why blue?".into());
        let receipt = FollowUpReceipt {
            nugget: Some(answer.clone()),
            nugget_id: Some("q-2".into()),
        };
        append_follow_up(&mut waypoint, "Why blue?", &receipt);
        assert_eq!(waypoint.content[2], answer);
    }
}
