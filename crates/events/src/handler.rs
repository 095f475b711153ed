/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decide with `handle`, then evolve with `apply` for each returned event. If
/// `handle` rejects the command the aggregate is left untouched.
///
/// For the journaled, single-writer pipeline use `LedgerService` in `medledger-infra`.
pub fn execute<A>(
    aggregate: &mut A,
    command: &A::Command,
) -> Result<Vec<A::Event>, A::Error>
where
    A: medledger_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
