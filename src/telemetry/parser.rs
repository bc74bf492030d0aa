//! Status-line decoder.
//!
//! Wire form, fields optional and unordered after the state token:
//!
//! ```text
//! <Run|MPos:1.000,2.000,3.000|WCO:0.000,0.000,0.000|FS:500,12000|Ov:100,100,100>
//! ```
//!
//! Parsing is total: a malformed tag is dropped on its own and never
//! discards the rest of the line.

use super::{MAX_AXES, MachineState, Overrides, Position, StatusReport};

/// Lines starting with this put the machine in Alarm.
pub const ALARM_PREFIX: &str = "ALARM:";

/// Decode one line. `None` for lines that are not status reports
/// (`ok`, `[MSG:...]`, blank).
pub fn parse(line: &str) -> Option<StatusReport> {
    let line = line.trim();
    let mut report = StatusReport::default();

    let body = if starts_with_ignore_case(line, ALARM_PREFIX) {
        report.state = Some(MachineState::Alarm);
        // Only trailing tags count; the bracketed state cannot override Alarm.
        line.find('<').map(|i| skip_state(bracket_body(&line[i..])))
    } else if line.starts_with('<') {
        let body = bracket_body(line);
        let (token, tags) = body.split_once('|').unwrap_or((body, ""));
        report.state = MachineState::from_token(token);
        Some(tags)
    } else {
        return None;
    };

    for field in body.unwrap_or("").split('|') {
        let Some((tag, payload)) = field.split_once(':') else {
            continue;
        };
        apply_tag(&mut report, tag.trim(), payload);
    }
    Some(report)
}

/// Text between `<` and `>` (or end of line when `>` is missing).
fn bracket_body(s: &str) -> &str {
    let s = s.strip_prefix('<').unwrap_or(s);
    s.split('>').next().unwrap_or(s)
}

fn skip_state(body: &str) -> &str {
    body.split_once('|').map_or("", |(_, tags)| tags)
}

fn starts_with_ignore_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn apply_tag(report: &mut StatusReport, tag: &str, payload: &str) {
    match tag {
        "MPos" => report.machine = parse_position(payload).or(report.machine),
        "WPos" => report.work = parse_position(payload).or(report.work),
        "WCO" => report.offset = parse_position(payload).or(report.offset),
        "FS" => {
            let mut it = payload.split(',');
            if let Some(feed) = it.next().and_then(parse_number) {
                report.feed_rate = Some(feed);
            }
            if let Some(speed) = it.next().and_then(parse_number) {
                report.spindle_speed = Some(speed);
            }
        }
        "F" => {
            if let Some(feed) = parse_number(payload) {
                report.feed_rate = Some(feed);
            }
        }
        "Ov" => {
            if let Some(ov) = parse_overrides(payload) {
                report.overrides = Some(ov);
            }
        }
        _ => {}
    }
}

fn parse_number(s: &str) -> Option<f32> {
    s.trim().parse::<f32>().ok().filter(|v| v.is_finite())
}

/// Axis count is comma count + 1; any bad component rejects the tag.
fn parse_position(payload: &str) -> Option<Position> {
    let mut values: heapless::Vec<f32, MAX_AXES> = heapless::Vec::new();
    for part in payload.split(',') {
        values.push(parse_number(part)?).ok()?;
    }
    Position::from_slice(&values)
}

fn parse_overrides(payload: &str) -> Option<Overrides> {
    let mut it = payload.split(',').map(|p| p.trim().parse::<u16>().ok());
    let feed = it.next()??;
    let rapid = it.next()??;
    let spindle = it.next()??;
    Some(Overrides {
        feed,
        rapid,
        spindle,
    })
}
