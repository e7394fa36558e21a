//! Command behavior through the engine.

mod common;

use std::thread;
use std::time::Duration;

use common::{errors, lines, test_config, TestRoom};
use parlor::web::ws::ServerMessage;
use parlor::{Config, InputAction};

#[test]
fn test_name_collision_leaves_second_user_unnamed() {
    let mut room = TestRoom::new();
    let (_, rat) = room.named("Rat");
    let other = room.connect(None);
    room.drain(other);

    assert_eq!(room.send(other, "/nick Rat"), InputAction::Keep);
    assert_eq!(errors(&room.drain(other)), vec!["nickname is already in use"]);
    assert!(room.engine.actor(other).is_none());

    // Case-insensitive collision too
    room.send(other, "/nick rAT");
    assert_eq!(errors(&room.drain(other)), vec!["nickname is already in use"]);
    assert_eq!(room.engine.registry.get_by_name("rat").unwrap().id, rat.id);
}

#[test]
fn test_same_nick_twice_is_already_named() {
    let mut room = TestRoom::with_config(Config {
        nick_slow_secs: 0,
        ..test_config()
    });
    let (conn, rat) = room.named("Rat");

    room.send(conn, "/nick Rat");
    assert_eq!(
        errors(&room.drain(conn)),
        vec!["that's already your name silly"]
    );
    assert_eq!(room.engine.registry.get_by_id(&rat.id).unwrap().name(), "Rat");
}

#[test]
fn test_nick_rate_limit_then_success() {
    let mut room = TestRoom::with_config(Config {
        nick_slow_secs: 1,
        ..test_config()
    });
    let (conn, _) = room.named("Rat");

    assert_eq!(room.send(conn, "hello"), InputAction::Clear);
    room.drain_all();

    assert_eq!(room.send(conn, "/nick Mouse"), InputAction::Keep);
    let errs = errors(&room.drain(conn));
    assert_eq!(errs, vec!["you're doing that too fast, wait 1 seconds."]);

    thread::sleep(Duration::from_millis(1100));
    assert_eq!(room.send(conn, "/nick Mouse"), InputAction::Clear);
    assert_eq!(room.engine.actor(conn).unwrap().name(), "Mouse");
}

#[test]
fn test_rename_is_announced_to_everyone() {
    let mut room = TestRoom::with_config(Config {
        nick_slow_secs: 0,
        ..test_config()
    });
    let (conn, _) = room.named("Rat");
    let watcher = room.connect(None);
    room.drain(watcher);

    room.send(conn, "/nick Mouse");
    let seen = lines(&room.drain(watcher));
    assert!(seen.contains(&"Rat changed their username to Mouse".to_string()));
}

#[test]
fn test_nick_validation() {
    let mut room = TestRoom::new();
    let conn = room.connect(None);
    room.drain(conn);

    room.send(conn, "/nick two words");
    assert_eq!(errors(&room.drain(conn)), vec!["no spaces in usernames"]);

    room.send(conn, "/nick a");
    assert_eq!(errors(&room.drain(conn)), vec!["must be at least 2 characters"]);

    room.send(conn, "/nick abcdefghijklmnop");
    assert_eq!(
        errors(&room.drain(conn)),
        vec!["too long, keep it under 15 characters"]
    );
    assert!(room.engine.actor(conn).is_none());
}

#[test]
fn test_guest_token_becomes_identity_id() {
    let mut room = TestRoom::new();
    let token = "67E55044-10B1-426F-9247-BB680E5FE0C8";
    let conn = room.connect(Some(token));

    room.send(conn, "/nick Rat");
    let rat = room.engine.actor(conn).unwrap();
    assert_eq!(rat.id, "67e55044-10b1-426f-9247-bb680e5fe0c8");

    let msgs = room.drain(conn);
    assert!(msgs.contains(&ServerMessage::Identity {
        identity: rat.clone()
    }));
    assert!(lines(&msgs).contains(&"Rat has joined the chat".to_string()));
}

#[test]
fn test_moderator_delete_broadcasts_removed_id() {
    let mut room = TestRoom::new();
    let (moderator, _) = room.moderator("Boss");
    let (chatter, _) = room.named("Rat");
    let watcher = room.connect(None);

    for i in 0..43 {
        room.send(chatter, &format!("message {i}"));
    }
    room.drain_all();

    assert_eq!(room.send(moderator, "/delete 42"), InputAction::Clear);
    assert!(room.engine.log.history().all(|m| m.id != 42));
    for conn in [moderator, chatter, watcher] {
        assert!(room
            .drain(conn)
            .contains(&ServerMessage::DeleteMessages { ids: vec![42] }));
    }

    // Already gone
    room.send(moderator, "/delete 42");
    assert_eq!(errors(&room.drain(moderator)), vec!["couldn't find message 42"]);

    room.send(moderator, "/delete abc");
    assert_eq!(errors(&room.drain(moderator)), vec!["please provide message id"]);
}

#[test]
fn test_moderator_commands_refuse_regular_users() {
    let mut room = TestRoom::new();
    let (conn, _) = room.named("Rat");
    let guest = room.connect(None);
    room.drain(guest);

    for line in ["/delete 1", "/ban Rat", "/timeout Rat", "/announce hi", "/emotes"] {
        assert_eq!(room.send(conn, line), InputAction::Clear);
        assert_eq!(errors(&room.drain(conn)), vec!["naughty naughty"]);
        room.send(guest, line);
        assert_eq!(errors(&room.drain(guest)), vec!["naughty naughty"]);
    }
}

#[test]
fn test_self_erase() {
    let mut room = TestRoom::new();
    let token = "0b9c2f3e-8d1a-4c5b-9e7f-112233445566";
    let first = room.connect(Some(token));
    room.send(first, "/nick Rat");
    let second = room.connect(Some(token));
    let watcher = room.connect(None);
    room.drain_all();

    assert_eq!(room.send(first, "/gdpr delete"), InputAction::Clear);
    assert!(room.engine.registry.get_by_id(token).is_none());
    assert!(room.engine.registry.is_name_available("Rat"));

    for conn in [first, second] {
        let msgs = room.drain(conn);
        assert!(msgs.contains(&ServerMessage::ResetIdentity));
        assert!(lines(&msgs).contains(&"goodbye is ur data".to_string()));
        assert!(room.engine.actor(conn).is_none());
    }

    let seen = lines(&room.drain(watcher));
    let goodbyes = seen.iter().filter(|l| *l == "Rat disconnected").count();
    assert_eq!(goodbyes, 1);

    // Both devices are lurkers now
    assert_eq!(room.engine.session.bound_count(), 0);
}

#[test]
fn test_gdpr_export_and_usage() {
    let mut room = TestRoom::new();
    let (conn, rat) = room.named("Rat");

    room.send(conn, "/gdpr export");
    let exported = lines(&room.drain(conn));
    assert!(exported[0].starts_with("Server stored info: "));
    assert!(exported[0].contains(&rat.id));

    room.send(conn, "/gdpr");
    assert_eq!(
        errors(&room.drain(conn)),
        vec!["please use with 'info', 'ip', 'export' or 'delete' after /gdpr"]
    );

    let guest = room.connect(None);
    room.drain(guest);
    assert_eq!(room.send(guest, "/gdpr export"), InputAction::Clear);
    assert_eq!(errors(&room.drain(guest)), vec!["no server stored data"]);

    room.send(guest, "/gdpr ip");
    assert!(lines(&room.drain(guest))[0].contains("Article 6(1)(f)"));
}

#[test]
fn test_color_and_colour() {
    let mut room = TestRoom::with_config(Config {
        other_slow_secs: 0,
        ..test_config()
    });
    let (conn, _) = room.named("Rat");

    room.send(conn, "/colour #ff0000");
    assert_eq!(errors(&room.drain(conn)), vec!["lern to speak american"]);

    room.send(conn, "/color red");
    assert_eq!(
        errors(&room.drain(conn)),
        vec!["invalid hex code. please use format #RRGGBB"]
    );

    assert_eq!(room.send(conn, "/color #ff00aa"), InputAction::Clear);
    let actor = room.engine.actor(conn).unwrap();
    assert_eq!(actor.nick.as_str(), "#FF00AARat");
    assert!(lines(&room.drain(conn))
        .contains(&"your color has been updated to #FF00AA".to_string()));
}

#[test]
fn test_profile_commands_need_a_nick() {
    let mut room = TestRoom::new();
    let guest = room.connect(None);
    room.drain(guest);

    assert_eq!(room.send(guest, "/afk"), InputAction::Clear);
    assert_eq!(
        errors(&room.drain(guest)),
        vec!["please use /nick <nickname> before trying to go afk"]
    );
    room.send(guest, "/status hi");
    assert_eq!(
        errors(&room.drain(guest)),
        vec!["please use /nick <nickname> before trying to set a status"]
    );
}

#[test]
fn test_status_and_afk() {
    let mut room = TestRoom::with_config(Config {
        other_slow_secs: 0,
        ..test_config()
    });
    let (conn, _) = room.named("Rat");

    room.send(conn, "/me eating <b>cheese</b>");
    assert!(lines(&room.drain(conn))
        .contains(&"your status is now: eating cheese".to_string()));

    room.send(conn, &format!("/status {}", "x".repeat(33)));
    assert_eq!(
        errors(&room.drain(conn)),
        vec!["too long, keep it under 32 characters"]
    );

    room.send(conn, "/afk");
    assert!(lines(&room.drain(conn)).contains(&"you've gone afk".to_string()));
    room.send(conn, "/afk");
    assert!(lines(&room.drain(conn)).contains(&"welcome back, Rat".to_string()));
}

#[test]
fn test_other_class_rate_limit() {
    let mut room = TestRoom::new();
    let (conn, _) = room.named("Rat");

    // The nick itself stamped the edit time
    room.send(conn, "/afk");
    let errs = errors(&room.drain(conn));
    assert_eq!(errs.len(), 1);
    assert!(errs[0].starts_with("you're doing that too fast"));
}

#[test]
fn test_import_rebinds_connection() {
    let mut room = TestRoom::new();
    let (_, rat) = room.named("Rat");
    let (other, _) = room.named("Mouse");
    let watcher = room.connect(None);
    room.drain_all();

    room.send(other, "/import not-a-guid");
    assert_eq!(errors(&room.drain(other)), vec!["not a valid GUID"]);

    let braced = format!("{{{}}}", rat.id.to_uppercase());
    assert_eq!(room.send(other, &format!("/import {braced}")), InputAction::Clear);
    assert_eq!(room.engine.actor(other).unwrap().id, rat.id);
    assert!(lines(&room.drain(other)).contains(&"identity changed to Rat".to_string()));

    let seen = lines(&room.drain(watcher));
    assert!(seen.contains(&"Mouse disconnected".to_string()));
    assert!(seen.contains(&"Rat connected".to_string()));
}

#[test]
fn test_import_unknown_id() {
    let mut room = TestRoom::new();
    let guest = room.connect(None);
    room.drain(guest);

    room.send(guest, "/import 00000000-0000-4000-8000-000000000000");
    let errs = errors(&room.drain(guest));
    assert_eq!(errs, vec!["couldn't find 00000000-0000-4000-8000-000000000000"]);
}

#[test]
fn test_timeout_mutes_and_purges_history() {
    let mut room = TestRoom::new();
    let (moderator, _) = room.moderator("Boss");
    let (troll, _) = room.named("Troll");
    let (rat, _) = room.named("Rat");

    room.send(troll, "spam one");
    room.send(rat, "hello");
    room.send(troll, "spam two");
    room.drain_all();

    assert_eq!(room.send(moderator, "/to troll 60"), InputAction::Clear);
    let remaining: Vec<String> = room
        .engine
        .log
        .history()
        .map(|m| m.content.clone())
        .collect();
    assert_eq!(remaining, vec!["hello"]);

    let msgs = room.drain(rat);
    assert!(msgs.contains(&ServerMessage::DeleteMessages { ids: vec![0, 2] }));
    assert!(lines(&msgs).contains(&"Troll has been timed out.".to_string()));

    room.send(troll, "let me talk");
    assert_eq!(errors(&room.drain(troll)), vec!["ur in timeout rn"]);
    assert_eq!(room.engine.log.len(), 1);
}

#[test]
fn test_timeout_bad_duration_uses_default() {
    let mut room = TestRoom::new();
    let (moderator, _) = room.moderator("Boss");
    let (_, troll) = room.named("Troll");

    let before = chrono::Utc::now();
    room.send(moderator, "/timeout Troll -5");
    let muted = room.engine.registry.get_by_id(&troll.id).unwrap();
    let secs = (muted.last_message - before).num_seconds();
    assert!((299..=301).contains(&secs), "muted for {secs}s");

    room.send(moderator, "/timeout");
    assert_eq!(errors(&room.drain(moderator)), vec!["missing target"]);
    room.send(moderator, "/timeout Nobody");
    assert_eq!(errors(&room.drain(moderator)), vec!["couldn't find Nobody"]);
}

#[test]
fn test_announcement_set_replayed_and_cleared() {
    let mut room = TestRoom::new();
    let (moderator, _) = room.moderator("Boss");

    room.send(moderator, "/announcement cheese day");
    assert!(lines(&room.drain(moderator)).contains(&"announcement: cheese day".to_string()));

    room.send(moderator, "/announce cheese day");
    assert_eq!(
        errors(&room.drain(moderator)),
        vec!["that's already the announcement"]
    );

    let late = room.connect(None);
    assert!(lines(&room.drain(late)).contains(&"announcement: cheese day".to_string()));

    room.send(moderator, "/announce");
    assert_eq!(lines(&room.drain(moderator)), vec!["announcement cleared"]);
    assert!(room.drain(late).iter().all(|m| m.type_name() != "announcement"));
}

#[test]
fn test_help_lists_moderator_section_for_moderators() {
    let mut room = TestRoom::new();
    let (user, _) = room.named("Rat");
    let (moderator, _) = room.moderator("Boss");

    room.send(user, "/h");
    assert!(!lines(&room.drain(user))[0].contains("Moderator Commands"));
    room.send(moderator, "/commands");
    assert!(lines(&room.drain(moderator))[0].contains("Moderator Commands"));
}

#[test]
fn test_chat_is_sanitized_and_stored() {
    let mut room = TestRoom::new();
    let (conn, rat) = room.named("Rat");
    let watcher = room.connect(None);
    room.drain_all();

    assert_eq!(room.send(conn, "  <script>x</script>hi there  "), InputAction::Clear);
    let msgs = room.drain(watcher);
    let chat = msgs.iter().find_map(|m| match m {
        ServerMessage::Chat(line) => Some(line.clone()),
        _ => None,
    });
    let chat = chat.expect("chat broadcast");
    assert_eq!(chat.content, "xhi there");
    assert_eq!(chat.author, rat.nick.as_str());
    assert!(room.engine.actor(conn).unwrap().last_message > rat.last_message);
}

#[test]
fn test_history_replayed_to_new_connection() {
    let mut room = TestRoom::with_config(Config {
        history_len: 3,
        ..test_config()
    });
    let (conn, _) = room.named("Rat");
    for i in 0..5 {
        room.send(conn, &format!("msg {i}"));
    }

    let late = room.connect(None);
    let replayed: Vec<i64> = room
        .drain(late)
        .iter()
        .filter_map(|m| match m {
            ServerMessage::Chat(line) => Some(line.id),
            _ => None,
        })
        .collect();
    assert_eq!(replayed, vec![2, 3, 4]);
}

#[test]
fn test_shared_token_rename_is_rate_limited() {
    let mut room = TestRoom::new();
    let token = "5a6b7c8d-9e0f-4a1b-8c2d-3e4f5a6b7c8d";
    let first = room.connect(Some(token));
    let second = room.connect(Some(token));
    room.drain_all();

    room.send(second, "/nick Rat");
    room.drain_all();

    // The first socket carries the same token, so it renames the same user
    assert_eq!(room.send(first, "/nick Mouse"), InputAction::Keep);
    let errs = errors(&room.drain(first));
    assert_eq!(errs.len(), 1);
    assert!(errs[0].starts_with("you're doing that too fast"), "{errs:?}");
    assert_eq!(room.engine.registry.get_by_id(token).unwrap().name(), "Rat");
    assert!(room.engine.registry.get_by_name("mouse").is_none());
}

#[test]
fn test_shared_token_rename_binds_and_announces() {
    let mut room = TestRoom::with_config(Config {
        nick_slow_secs: 0,
        ..test_config()
    });
    let token = "5a6b7c8d-9e0f-4a1b-8c2d-3e4f5a6b7c8d";
    let first = room.connect(Some(token));
    let second = room.connect(Some(token));
    let watcher = room.connect(None);
    room.send(second, "/nick Rat");
    room.drain_all();

    assert_eq!(room.send(first, "/nick Mouse"), InputAction::Clear);
    assert_eq!(room.engine.actor(first).unwrap().name(), "Mouse");
    assert_eq!(room.engine.actor(second).unwrap().name(), "Mouse");
    assert_eq!(room.engine.registry.len(), 1);

    let seen = lines(&room.drain(watcher));
    assert!(seen.contains(&"Rat changed their username to Mouse".to_string()));
    assert!(!seen.contains(&"Mouse has joined the chat".to_string()));
    assert!(room
        .drain(second)
        .iter()
        .any(|m| matches!(m, ServerMessage::Identity { identity } if identity.name() == "Mouse")));
}

#[test]
fn test_announce_is_rate_limited() {
    let mut room = TestRoom::with_config(Config {
        slow_mode_secs: 60,
        ..test_config()
    });
    let (moderator, _) = room.moderator("Boss");

    assert_eq!(room.send(moderator, "/announce cheese day"), InputAction::Clear);
    room.drain_all();

    assert_eq!(room.send(moderator, "/announce cracker day"), InputAction::Keep);
    let errs = errors(&room.drain(moderator));
    assert_eq!(errs, vec!["you're doing that too fast, wait 60 seconds."]);
    assert_eq!(room.engine.session.announcement(), "cheese day");
}

#[test]
fn test_import_own_id_is_silent() {
    let mut room = TestRoom::new();
    let (conn, rat) = room.named("Rat");
    let watcher = room.connect(None);
    room.drain_all();

    assert_eq!(room.send(conn, &format!("/import {}", rat.id)), InputAction::Clear);
    assert!(lines(&room.drain(conn)).contains(&"identity changed to Rat".to_string()));
    let seen = lines(&room.drain(watcher));
    assert!(!seen.contains(&"Rat disconnected".to_string()));
    assert!(!seen.contains(&"Rat connected".to_string()));
}
