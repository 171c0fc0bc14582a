use ctf_types::Submission;

/// Newest-first copy of `history`, ties broken by id.
pub fn history_for_display(history: &[Submission]) -> Vec<Submission> {
    let mut view = history.to_vec();
    view.sort_by(|a, b| {
        b.submitted_at
            .cmp(&a.submitted_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    view
}
