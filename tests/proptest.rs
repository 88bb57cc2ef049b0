//! Property-based tests for the parsing/line-assembly primitives that do
//! the most subtle byte-level work: `--env` classification and PTY line
//! buffering, plus the restart-backoff arithmetic (spec §8 invariants 3/4).
//! Modeled on the pack's `darwin-timeout` proptest suite.

use proptest::prelude::*;

use supervisord_mini::child::reap::{next_wait_time, reset_wait_time};
use supervisord_mini::envlist::{EnvOp, parse_env_arg};
use supervisord_mini::pty_reader::{LineBuffer, PushOutcome};

/* ============================================================================
 * --env classification
 * ============================================================================ */

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Any `VAR=VAL` with a non-empty VAR and no embedded NUL parses as a
    /// `Set`, and the parts survive round-trip regardless of how many `=`
    /// signs VAL itself contains.
    #[test]
    fn assignment_round_trips(
        var in "[a-zA-Z_][a-zA-Z0-9_]{0,15}",
        val in "[^\0=]{0,32}",
    ) {
        let arg = format!("{var}={val}");
        let op = parse_env_arg(&arg).unwrap();
        prop_assert_eq!(op, EnvOp::Set(var, val));
    }

    /// Any VAR with no `=` and no NUL parses as an `Unset` of exactly that
    /// name.
    #[test]
    fn bare_name_is_always_an_unset(var in "[a-zA-Z_][a-zA-Z0-9_]{0,15}") {
        prop_assume!(!var.contains('='));
        let op = parse_env_arg(&var).unwrap();
        prop_assert_eq!(op, EnvOp::Unset(var));
    }

    /// A leading `=`, regardless of what follows, is always rejected --
    /// never silently treated as a set or an unset of the empty string.
    #[test]
    fn leading_equals_is_always_rejected(rest in "[^\0]{0,32}") {
        let arg = format!("={rest}");
        prop_assert!(parse_env_arg(&arg).is_err());
    }

    /// A NUL byte anywhere in the argument is always rejected, never
    /// silently truncated.
    #[test]
    fn embedded_nul_is_always_rejected(
        prefix in "[a-zA-Z0-9_=]{0,16}",
        suffix in "[a-zA-Z0-9_=]{0,16}",
    ) {
        let arg = format!("{prefix}\0{suffix}");
        prop_assert!(parse_env_arg(&arg).is_err());
    }
}

/* ============================================================================
 * PTY line assembly
 * ============================================================================ */

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Feeding any sequence of non-terminator, non-CR bytes followed by a
    /// single `\n` yields exactly that text back out, with no terminator
    /// bytes surviving into the returned line.
    #[test]
    fn plain_line_round_trips(body in "[\x20-\x7e]{0,64}") {
        let mut lb = LineBuffer::new();
        for &b in body.as_bytes() {
            lb.push_byte(b);
        }
        let ready_at_end = lb.push_byte(b'\n') == PushOutcome::LineReady;
        prop_assert!(ready_at_end);
        prop_assert_eq!(lb.take_line(), body);
    }

    /// Appending `\r\n` strips exactly the one trailing `\r`, regardless of
    /// whether the body itself contains other `\r` bytes earlier on.
    #[test]
    fn trailing_crlf_strips_only_the_last_cr(body in "[\x20-\x7e]{0,64}") {
        let mut lb = LineBuffer::new();
        for &b in body.as_bytes() {
            lb.push_byte(b);
        }
        lb.push_byte(b'\r');
        let outcome = lb.push_byte(b'\n');
        prop_assert_eq!(outcome, PushOutcome::LineReady);
        let line = lb.take_line();
        prop_assert_eq!(line, body);
    }

    /// The buffer never grows an unbounded line: once it reaches the cap
    /// it reports the line as ready rather than accepting more bytes.
    #[test]
    fn overlong_input_is_always_flushed_at_the_cap(extra in 0usize..128) {
        let mut lb = LineBuffer::new();
        let total = supervisord_mini::pty_reader::LINE_CAP - 1 + extra;
        let mut saw_ready = false;
        for _ in 0..total {
            if lb.push_byte(b'x') == PushOutcome::LineReady {
                saw_ready = true;
                let line = lb.take_line();
                prop_assert!(line.len() <= supervisord_mini::pty_reader::LINE_CAP - 1);
            }
        }
        prop_assert!(saw_ready);
    }
}

/* ============================================================================
 * Restart backoff (spec §8 invariants 3/4)
 * ============================================================================ */

#[derive(Debug, Clone, Copy)]
enum Event {
    Death,
    Resume,
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Over any sequence of deaths and explicit resumes, `wait_time` never
    /// leaves `[min_wait, max(min_wait, max_wait)]`, and it never decreases
    /// from one death to the next unless a resume intervened.
    #[test]
    fn wait_time_stays_bounded_and_monotone_between_deaths(
        min_wait in 1u32..10,
        max_wait in 1u32..400,
        events in prop::collection::vec(prop_oneof![Just(Event::Death), Just(Event::Resume)], 0..64),
    ) {
        let max_wait = max_wait.max(min_wait); // config.rs raises max below min at startup
        let mut wait_time = min_wait;
        let mut last_death_wait: Option<u32> = None;

        for event in events {
            match event {
                Event::Death => {
                    prop_assert!(wait_time >= min_wait);
                    prop_assert!(wait_time <= max_wait);
                    if let Some(prev) = last_death_wait {
                        prop_assert!(wait_time >= prev, "wait_time decreased between deaths without a resume");
                    }
                    last_death_wait = Some(wait_time);
                    wait_time = next_wait_time(wait_time, max_wait);
                }
                Event::Resume => {
                    wait_time = reset_wait_time(min_wait);
                    last_death_wait = None;
                }
            }
        }
    }

    /// Doubling never overshoots `max_wait` in one step, for any starting
    /// point already inside bounds.
    #[test]
    fn next_wait_time_never_exceeds_max(current in 1u32..10_000, max_wait in 1u32..10_000) {
        prop_assert!(next_wait_time(current, max_wait) <= max_wait);
    }
}
