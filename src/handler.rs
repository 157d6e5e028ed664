use serenity::{
    async_trait,
    client::{Context, EventHandler},
    model::{
        channel::{Channel, Message, ReactionType},
        gateway::Ready,
    },
};
use tracing::{debug, info, warn};

use crate::{
    ai::ResponseGenerator,
    attachment::{self, RawAttachment},
    config::Configuration,
    intake::{self, InboundEvent},
};

pub struct Handler {
    config: Configuration,
    generator: Box<dyn ResponseGenerator>,
}

impl Handler {
    pub fn new(config: Configuration, generator: Box<dyn ResponseGenerator>) -> Self {
        Self { config, generator }
    }

    async fn build_event(&self, ctx: &Context, msg: &Message) -> InboundEvent {
        let bot_id = ctx.cache.current_user().id;
        let mentions_bot = msg.mentions_me(ctx).await.unwrap_or(false);
        let is_reply_to_bot = msg
            .referenced_message
            .as_deref()
            .is_some_and(|replied| replied.author.id == bot_id);
        // only guild channels have a name; DMs stay None and get filtered out
        let channel_name = match msg.channel_id.to_channel(ctx).await {
            Ok(Channel::Guild(channel)) => Some(channel.name),
            _ => None,
        };

        // mentions appear in raw content as either <@id> or <@!id>
        let mention_tokens = msg
            .mentions
            .iter()
            .flat_map(|user| [format!("<@{}>", user.id), format!("<@!{}>", user.id)])
            .collect();

        let display_name = match msg.author_nick(&ctx.http).await {
            Some(nick) => nick,
            None => msg
                .author
                .global_name
                .clone()
                .unwrap_or_else(|| msg.author.name.clone()),
        };

        InboundEvent {
            author_is_bot: msg.author.bot,
            mentions_bot,
            is_reply_to_bot,
            channel_name,
            raw_text: msg.content.clone(),
            mention_tokens,
            display_name,
        }
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("{} is connected", ready.user.name);
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let event = self.build_event(&ctx, &msg).await;
        let Some(prompt) = intake::evaluate(&event, &self.config.allowed_channels) else {
            return;
        };

        debug!(
            "accepted message from {} in #{}",
            prompt.display_name,
            event.channel_name.as_deref().unwrap_or_default()
        );

        // best-effort acknowledgment; never blocks handling
        let reaction = ReactionType::Unicode(self.config.reaction_emoji.clone());
        if let Err(err) = msg.react(&ctx.http, reaction).await {
            debug!("failed to add acknowledgment reaction: {err}");
        }

        let attachments = download_attachments(&msg).await;
        let normalized = attachment::normalize(self.generator.attachment_mode(), attachments);

        let typing = msg.channel_id.start_typing(&ctx.http);
        let reply = self
            .generator
            .generate_response(&prompt.content, &prompt.display_name, &normalized)
            .await;
        typing.stop();

        if let Err(err) = msg.reply_ping(&ctx.http, reply.text).await {
            warn!("failed to send reply: {err}");
        }
    }
}

async fn download_attachments(msg: &Message) -> Vec<RawAttachment> {
    let mut attachments = Vec::with_capacity(msg.attachments.len());
    for attachment in &msg.attachments {
        match attachment.download().await {
            Ok(bytes) => attachments.push(RawAttachment {
                bytes,
                declared_type: attachment.content_type.clone(),
            }),
            Err(err) => warn!("failed to download attachment {}: {err}", attachment.filename),
        }
    }
    attachments
}
