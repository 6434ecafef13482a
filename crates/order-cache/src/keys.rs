//! Fast-store key schema (spec.md §6.4). Centralized here so every writer
//! and reader of the cache agrees on the same key shape.

pub fn user(user_id: &str) -> String {
    format!("user:{user_id}")
}

pub fn processed_event(event_id: &str) -> String {
    format!("processed_event:{event_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_match_the_documented_shape() {
        assert_eq!(user("user_abc"), "user:user_abc");
        assert_eq!(processed_event("evt-1"), "processed_event:evt-1");
    }
}
