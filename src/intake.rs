use std::collections::HashSet;

/// One inbound chat message, reduced to the fields the filter cares about.
/// Built by the event wiring, discarded after handling.
#[derive(Debug, Clone)]
pub struct InboundEvent {
    pub author_is_bot: bool,
    pub mentions_bot: bool,
    pub is_reply_to_bot: bool,
    /// `None` for channels without a resolvable name (DMs).
    pub channel_name: Option<String>,
    pub raw_text: String,
    pub mention_tokens: HashSet<String>,
    pub display_name: String,
}

/// A message that passed the filter, with mentions stripped out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedPrompt {
    pub content: String,
    pub display_name: String,
}

/// Decides whether an event is in scope and extracts the clean prompt.
///
/// Rejects the bot's own messages, messages that neither mention the bot nor
/// reply to one of its messages, and messages outside the allow-list.
/// Channel names are matched verbatim; an empty allow-list admits nothing.
pub fn evaluate(event: &InboundEvent, allowed_channels: &HashSet<String>) -> Option<AcceptedPrompt> {
    if event.author_is_bot {
        return None;
    }
    if !(event.mentions_bot || event.is_reply_to_bot) {
        return None;
    }
    let channel_name = event.channel_name.as_deref()?;
    if !allowed_channels.contains(channel_name) {
        return None;
    }
    Some(AcceptedPrompt {
        content: strip_mentions(&event.raw_text, &event.mention_tokens),
        display_name: event.display_name.clone(),
    })
}

/// Removes every mention token as a literal substring, then trims the edges.
/// Interior whitespace is left untouched.
pub fn strip_mentions(raw_text: &str, mention_tokens: &HashSet<String>) -> String {
    let mut content = raw_text.to_string();
    for token in mention_tokens {
        content = content.replace(token, "");
    }
    content.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> InboundEvent {
        InboundEvent {
            author_is_bot: false,
            mentions_bot: true,
            is_reply_to_bot: false,
            channel_name: Some("ai-chat".into()),
            raw_text: "<@42> こんにちは".into(),
            mention_tokens: HashSet::from(["<@42>".into()]),
            display_name: "たろう".into(),
        }
    }

    fn allowed() -> HashSet<String> {
        HashSet::from(["ai-chat".into()])
    }

    #[test]
    fn rejects_bot_authors_regardless_of_triggers() {
        let mut ev = event();
        ev.author_is_bot = true;
        ev.is_reply_to_bot = true;
        assert!(evaluate(&ev, &allowed()).is_none());
    }

    #[test]
    fn accepts_on_mention_or_reply() {
        for (mentions, reply, expected) in [
            (false, false, false),
            (true, false, true),
            (false, true, true),
            (true, true, true),
        ] {
            let mut ev = event();
            ev.mentions_bot = mentions;
            ev.is_reply_to_bot = reply;
            assert_eq!(
                evaluate(&ev, &allowed()).is_some(),
                expected,
                "mentions={mentions} reply={reply}"
            );
        }
    }

    #[test]
    fn rejects_disallowed_channel() {
        let mut ev = event();
        ev.channel_name = Some("general".into());
        assert!(evaluate(&ev, &allowed()).is_none());
    }

    #[test]
    fn channel_match_is_case_sensitive() {
        let mut ev = event();
        ev.channel_name = Some("AI-Chat".into());
        assert!(evaluate(&ev, &allowed()).is_none());
    }

    #[test]
    fn empty_allow_list_admits_nothing() {
        assert!(evaluate(&event(), &HashSet::new()).is_none());
    }

    #[test]
    fn rejects_unnamed_channel() {
        let mut ev = event();
        ev.channel_name = None;
        assert!(evaluate(&ev, &allowed()).is_none());
    }

    #[test]
    fn strips_every_token_occurrence_without_collapsing_whitespace() {
        let tokens = HashSet::from(["<@123>".to_string()]);
        let stripped = strip_mentions("<@123> hello <@123> world", &tokens);
        // interior double space survives; only the edges are trimmed
        assert_eq!(stripped, "hello  world");
    }

    #[test]
    fn strips_tokens_for_multiple_users() {
        let tokens = HashSet::from(["<@1>".to_string(), "<@!2>".to_string()]);
        let stripped = strip_mentions("<@1> ping <@!2>", &tokens);
        assert_eq!(stripped, "ping");
    }

    #[test]
    fn accepted_prompt_carries_clean_content_and_name() {
        let prompt = evaluate(&event(), &allowed()).unwrap();
        assert_eq!(prompt.content, "こんにちは");
        assert_eq!(prompt.display_name, "たろう");
    }
}
