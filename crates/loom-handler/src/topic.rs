//! Dotted topic patterns: `*` matches one segment, `#` matches zero or more.

pub fn topic_matches(pattern: &str, topic: &str) -> bool {
  let pattern: Vec<&str> = pattern.split('.').collect();
  let topic: Vec<&str> = topic.split('.').collect();
  segments_match(&pattern, &topic)
}

fn segments_match(pattern: &[&str], topic: &[&str]) -> bool {
  match (pattern.split_first(), topic.split_first()) {
    (None, None) => true,
    (Some((&"#", rest)), _) => {
      segments_match(rest, topic) || (!topic.is_empty() && segments_match(pattern, &topic[1..]))
    }
    (Some((&"*", rest)), Some((_, topic_rest))) => segments_match(rest, topic_rest),
    (Some((p, rest)), Some((t, topic_rest))) if p == t => segments_match(rest, topic_rest),
    _ => false,
  }
}
