//! Deterministic user colors.
//!
//! Every client sorts the current usernames and indexes a fixed palette,
//! so all participants agree on everyone's color without coordination.

use crossterm::style::Color;

/// Ten distinguishable terminal colors, in assignment order.
pub const USER_COLORS: [Color; 10] = [
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::DarkYellow,
    Color::DarkMagenta,
    Color::DarkGreen,
    Color::DarkRed,
    Color::Red,
];

/// The color for `username` given the full user list. Stable under list
/// order: the list is sorted before indexing.
pub fn color_for_username(username: &str, usernames: &[String]) -> Color {
    let mut sorted: Vec<&str> = usernames.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let index = sorted.iter().position(|name| *name == username).unwrap_or(0);
    USER_COLORS[index % USER_COLORS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn assignment_ignores_list_order() {
        let a = names(&["carol", "alice", "bob"]);
        let b = names(&["bob", "carol", "alice"]);
        for user in ["alice", "bob", "carol"] {
            assert_eq!(color_for_username(user, &a), color_for_username(user, &b));
        }
    }

    #[test]
    fn colors_follow_sorted_index() {
        let users = names(&["bob", "alice"]);
        assert_eq!(color_for_username("alice", &users), USER_COLORS[0]);
        assert_eq!(color_for_username("bob", &users), USER_COLORS[1]);
    }

    #[test]
    fn palette_wraps_past_ten_users() {
        let many: Vec<String> = (0..12).map(|i| format!("user{i:02}")).collect();
        assert_eq!(color_for_username("user00", &many), USER_COLORS[0]);
        assert_eq!(color_for_username("user10", &many), USER_COLORS[0]);
        assert_eq!(color_for_username("user11", &many), USER_COLORS[1]);
    }

    #[test]
    fn unknown_users_fall_back_to_the_first_color() {
        let users = names(&["alice"]);
        assert_eq!(color_for_username("mallory", &users), USER_COLORS[0]);
    }
}
