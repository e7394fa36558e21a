//! One handler per command kind.
//!
//! Handlers run on the engine task with exclusive access to every service.
//! Each one checks authorization and rate limits itself, mutates, then
//! sends the resulting notices.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, info};

use super::error::{CommandError, InputAction};
use super::parse::{format_help, CommandKind, Invocation};
use crate::chat::MessageKind;
use crate::engine::{guest_id, Engine};
use crate::hub::{ConnId, Target};
use crate::identity::{Identity, IdentityError};
use crate::moderation::{cooldown, ActionClass, ModerationError, TextKind};
use crate::web::ws::ServerMessage;

type HandlerResult = Result<InputAction, CommandError>;

const GDPR_INFO: &[&str] = &[
    "---------------------------------------------------------------------------------------------",
    "We store the following data server side:",
    "id          | Unique identifier; lets several sessions share one nickname",
    "nick        | Chosen nickname and color set by the /nick and /color commands",
    "lastChanged | Timestamp of the last profile change, to prevent nick abuse",
    "status      | Chosen status displayed in the user listing, set by /status",
    "isMod       | Flag allowing moderator actions",
    "lastMessage | Timestamp of the last message sent, for timeouts and idle detection",
    "isAfk       | AFK flag for the user listing, set by /afk",
    "---------------------------------------------------------------------------------------------",
    "Use /gdpr info to see this message again",
    "Use /gdpr ip to see how and why we use IP addresses",
    "Use /gdpr export to see a copy of your data stored on the server, if any.",
    "Use /gdpr delete to permanently remove your data from the server.",
    "---------------------------------------------------------------------------------------------",
];

const GDPR_IP: &[&str] = &[
    "---------------------------------------------------------------------------------------------",
    "We use IP addresses for ban enforcement and system protection as allowed under Article 6(1)(f) of the GDPR.",
    "IP addresses are only stored long term in the event of a ban.",
    "A stored IP address is kept only with a timestamp, so bans can be reviewed and reversed later.",
    "A stored IP address is first passed through a one way keyed hash. A plain-text IP address is never stored.",
    "Every connecting IP address is hashed the same way and compared to the stored bans.",
    "An IP address is linked to a user only at the instant of banning. This linkage is not stored.",
    "---------------------------------------------------------------------------------------------",
];

fn guid_regex() -> &'static Regex {
    static GUID: OnceLock<Regex> = OnceLock::new();
    GUID.get_or_init(|| {
        Regex::new(r"(?i)^\{?[0-9a-f]{8}-([0-9a-f]{4}-){3}[0-9a-f]{12}\}?$")
            .expect("GUID pattern is valid")
    })
}

/// Run a parsed command for `conn`.
pub fn dispatch(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let kind = CommandKind::from_name(&inv.name).ok_or(CommandError::NotFound)?;
    debug!("{} runs {}", conn, kind);

    match kind {
        CommandKind::Help => help(engine, conn, inv),
        CommandKind::Nick => nick(engine, conn, inv),
        CommandKind::Color => color(engine, conn, inv),
        CommandKind::Colour => Err(CommandError::Colour),
        CommandKind::Import => import(engine, conn, inv),
        CommandKind::Afk => afk(engine, conn, inv),
        CommandKind::Status => status(engine, conn, inv),
        CommandKind::Gdpr => gdpr(engine, conn, inv),
        CommandKind::Announce => announce(engine, conn, inv),
        CommandKind::Ban => ban(engine, conn, inv),
        CommandKind::Timeout => timeout(engine, conn, inv),
        CommandKind::Delete => delete(engine, conn, inv),
        CommandKind::Emotes => emotes(engine, conn, inv),
    }
}

fn require_identity(engine: &Engine, conn: ConnId, doing: &'static str) -> Result<Identity, CommandError> {
    engine.actor(conn).ok_or(CommandError::NeedsIdentity(doing))
}

fn require_moderator(engine: &Engine, conn: ConnId) -> Result<Identity, CommandError> {
    engine
        .actor(conn)
        .filter(|identity| identity.is_mod)
        .ok_or(CommandError::Unauthorized)
}

fn require_target<'a>(inv: &'a Invocation) -> Result<&'a str, CommandError> {
    match inv.arg(0) {
        "" => Err(CommandError::Usage("missing target".to_string())),
        name => Ok(name),
    }
}

fn info_line(engine: &Engine, conn: ConnId, text: impl Into<String>) {
    engine
        .log
        .send_system(&engine.hub, Target::Conn(conn), MessageKind::Info, text);
}

fn announce_line(engine: &Engine, kind: MessageKind, text: impl Into<String>) {
    engine.log.send_system(&engine.hub, Target::All, kind, text);
}

fn help(engine: &mut Engine, conn: ConnId, _inv: &Invocation) -> HandlerResult {
    let is_mod = engine.actor(conn).is_some_and(|identity| identity.is_mod);
    info_line(engine, conn, format_help(is_mod));
    Ok(InputAction::Clear)
}

fn nick(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let bound = engine.session.binding(conn).is_some();
    // An unbound connection whose token names a stored identity is that user
    let actor = match engine.actor(conn) {
        Some(identity) => Some(identity),
        None => engine
            .hub
            .token(conn)
            .and_then(guest_id)
            .and_then(|id| engine.registry.get_by_id(&id).cloned()),
    };
    if let Some(identity) = &actor {
        engine.moderation.time_check(identity, ActionClass::Nick)?;
    }
    if inv.args.len() > 1 {
        return Err(ModerationError::Whitespace.into());
    }
    let clean = engine.moderation.text_check(inv.arg(0), None, TextKind::Nick)?;

    // Guests claim the handshake token as their id
    let id = match &actor {
        Some(identity) => Some(identity.id.clone()),
        None => engine.hub.token(conn).and_then(guest_id),
    };
    let updated = engine.registry.set_nick(id.as_deref(), &clean)?;

    match &actor {
        Some(old) => {
            if bound {
                engine.session.propagate(&engine.hub, &updated);
            } else {
                engine.hub.send(
                    conn,
                    ServerMessage::Identity {
                        identity: updated.clone(),
                    },
                );
                engine.session.bind(&engine.hub, conn, updated.clone());
            }
            announce_line(
                engine,
                MessageKind::Announcement,
                format!("{} changed their username to {}", old.name(), updated.name()),
            );
        }
        None => {
            engine.hub.send(
                conn,
                ServerMessage::Identity {
                    identity: updated.clone(),
                },
            );
            engine.session.bind(&engine.hub, conn, updated.clone());
            announce_line(
                engine,
                MessageKind::Announcement,
                format!("{} has joined the chat", updated.name()),
            );
        }
    }
    Ok(InputAction::Clear)
}

fn color(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let actor = require_identity(engine, conn, "set a color")?;
    let clean = engine
        .moderation
        .text_check(inv.arg(0), Some(&actor), TextKind::Color)?;

    let updated = engine.registry.set_color(&actor.id, &clean)?;
    engine.session.propagate(&engine.hub, &updated);
    info_line(
        engine,
        conn,
        format!("your color has been updated to {}", clean.as_str()),
    );
    Ok(InputAction::Clear)
}

fn import(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let raw = inv.arg(0);
    if !guid_regex().is_match(raw) {
        return Err(CommandError::InvalidFormat("GUID"));
    }
    let id = guest_id(raw).ok_or(CommandError::InvalidFormat("GUID"))?;
    let identity = engine
        .registry
        .get_by_id(&id)
        .cloned()
        .ok_or_else(|| IdentityError::NotFound(raw.to_string()))?;

    let previous = engine.session.bind(&engine.hub, conn, identity.clone());
    engine.hub.send(
        conn,
        ServerMessage::Identity {
            identity: identity.clone(),
        },
    );
    info_line(engine, conn, format!("identity changed to {}", identity.name()));

    if previous.as_ref().is_some_and(|p| p.id == identity.id) {
        return Ok(InputAction::Clear);
    }
    if let Some(previous) = previous {
        announce_line(
            engine,
            MessageKind::Announcement,
            format!("{} disconnected", previous.name()),
        );
    }
    announce_line(
        engine,
        MessageKind::Announcement,
        format!("{} connected", identity.name()),
    );
    Ok(InputAction::Clear)
}

fn afk(engine: &mut Engine, conn: ConnId, _inv: &Invocation) -> HandlerResult {
    let actor = require_identity(engine, conn, "go afk")?;
    engine.moderation.time_check(&actor, ActionClass::Other)?;

    let updated = engine.registry.toggle_afk(&actor.id)?;
    engine.session.propagate(&engine.hub, &updated);
    let text = if updated.is_afk {
        "you've gone afk".to_string()
    } else {
        format!("welcome back, {}", updated.name())
    };
    info_line(engine, conn, text);
    Ok(InputAction::Clear)
}

fn status(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let actor = require_identity(engine, conn, "set a status")?;
    let clean = engine
        .moderation
        .text_check(&inv.full_args, Some(&actor), TextKind::Status)?;

    let updated = engine.registry.set_status(&actor.id, &clean)?;
    engine.session.propagate(&engine.hub, &updated);
    info_line(engine, conn, format!("your status is now: {}", updated.status));
    Ok(InputAction::Clear)
}

fn gdpr(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    match inv.arg(0) {
        "info" => {
            info_line(engine, conn, GDPR_INFO.join("\n"));
            Ok(InputAction::Clear)
        }
        "ip" => {
            info_line(engine, conn, GDPR_IP.join("\n"));
            Ok(InputAction::Clear)
        }
        "export" => {
            let actor = engine.actor(conn).ok_or(CommandError::NoData)?;
            let record = serde_json::to_string_pretty(&actor).unwrap_or_else(|_| format!("{actor:?}"));
            info_line(engine, conn, format!("Server stored info: {record}"));
            Ok(InputAction::Clear)
        }
        "delete" => {
            let actor = engine.actor(conn).ok_or(CommandError::NoData)?;
            for other in engine.session.connections_of(&actor.id) {
                engine.hub.send(other, ServerMessage::ResetIdentity);
                info_line(engine, other, "goodbye is ur data");
            }
            engine.session.unbind_all(&engine.hub, &actor.id);
            engine.registry.delete(&actor.id)?;

            announce_line(
                engine,
                MessageKind::Announcement,
                format!("{} disconnected", actor.name()),
            );
            info!("{} erased identity {}", conn, actor.id);
            Ok(InputAction::Clear)
        }
        _ => Err(CommandError::Usage(
            "please use with 'info', 'ip', 'export' or 'delete' after /gdpr".to_string(),
        )),
    }
}

fn announce(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let moderator = require_moderator(engine, conn)?;
    let clean = engine
        .moderation
        .text_check(&inv.full_args, Some(&moderator), TextKind::Announcement)?;

    engine.session.set_announcement(&engine.hub, &clean)?;
    let updated = engine
        .registry
        .set_last_action(&moderator.id, Utc::now())?;
    engine.session.refresh(&updated);
    if clean.is_empty() {
        info_line(engine, conn, "announcement cleared");
    }
    Ok(InputAction::Clear)
}

fn ban(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let moderator = require_moderator(engine, conn)?;
    let name = require_target(inv)?;
    let target = engine
        .registry
        .get_by_name(name)
        .cloned()
        .ok_or_else(|| IdentityError::NotFound(name.to_string()))?;

    engine.bans.ban(
        &mut engine.hub,
        &mut engine.session,
        &mut engine.registry,
        &target,
    )?;
    announce_line(
        engine,
        MessageKind::Info,
        format!("{} has been banned.", target.name()),
    );
    info!("{} banned {}", moderator.name(), target.name());
    Ok(InputAction::Clear)
}

fn timeout(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    let moderator = require_moderator(engine, conn)?;
    let name = require_target(inv)?;
    let target = engine
        .registry
        .get_by_name(name)
        .cloned()
        .ok_or_else(|| IdentityError::NotFound(name.to_string()))?;

    let secs = inv
        .arg(1)
        .parse::<i64>()
        .ok()
        .and_then(|secs| u64::try_from(secs).ok())
        .unwrap_or(engine.config().timeout_default_secs);
    let until = Utc::now() + cooldown(secs);

    let updated = engine.registry.set_last_action(&target.id, until)?;
    engine.session.propagate(&engine.hub, &updated);

    let ids = engine.log.ids_by_author(target.name());
    if !ids.is_empty() {
        engine.log.delete_messages(&engine.hub, &ids);
    }

    announce_line(
        engine,
        MessageKind::Info,
        format!("{} has been timed out.", target.name()),
    );
    info!("{} timed out {} for {}s", moderator.name(), target.name(), secs);
    Ok(InputAction::Clear)
}

fn delete(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    require_moderator(engine, conn)?;
    let id = inv
        .arg(0)
        .parse::<i64>()
        .map_err(|_| CommandError::Usage("please provide message id".to_string()))?;

    let removed = engine.log.delete_messages(&engine.hub, &[id]);
    if removed.is_empty() {
        return Err(CommandError::MessageNotFound(id));
    }
    Ok(InputAction::Clear)
}

fn emotes(engine: &mut Engine, conn: ConnId, inv: &Invocation) -> HandlerResult {
    require_moderator(engine, conn)?;
    let requested = Some(inv.arg(0)).filter(|id| !id.is_empty());
    let set_id = engine.session.emote_set_id(requested)?;

    let text = match requested {
        Some(_) => format!("fetching emote set {set_id}..."),
        None => "reloading emotes from config...".to_string(),
    };
    info_line(engine, conn, text);
    engine.request_emotes(Some(conn), set_id);
    Ok(InputAction::Clear)
}
