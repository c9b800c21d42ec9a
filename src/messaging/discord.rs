//! Discord adapter (serenity): gateway events in, replies and follow-ups out.

use crate::agent::relay::{AskRequest, Relay};
use crate::error::{MessagingError, Result};
use crate::messaging::traits::{ChannelHistory, HistoryMessage, Responder};
use crate::{prompts, Attachment, BotIdentity, ConversationKey, EventId, InboundMessage};

use serenity::all::{
    ActivityData, ChannelId, Client, Colour, Command, CommandInteraction, CommandOptionType,
    Context, CreateCommand, CreateCommandOption, CreateEmbed, CreateEmbedFooter,
    CreateInteractionResponse, CreateInteractionResponseFollowup,
    CreateInteractionResponseMessage, EventHandler, GatewayError, GatewayIntents, GetMessages,
    Http, Interaction, Message, MessageId, OnlineStatus, Ready, ResolvedValue,
};
use serenity::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Wait between gateway reconnect attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Usage shown by `/help`: (field name, field value).
const HELP_FIELDS: &[(&str, &str)] = &[
    (
        "Ask with a mention",
        "@bot your question\nYou can attach images too.",
    ),
    ("/ask", "Ask a question\n`/ask question:your question`"),
    (
        "/clear",
        "Clear your conversation history\nUse it when you want to start a new topic.",
    ),
    ("/help", "Show this help"),
];

const HELP_FOOTER: &str = "History is kept per channel and per user.";

/// Gateway intents the bot needs to see and read mentions.
pub fn intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::DIRECT_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
}

/// Connect to the gateway and keep reconnecting until the token is rejected.
pub async fn run(token: &str, relay: Arc<Relay>) -> Result<()> {
    loop {
        let mut client = Client::builder(token, intents())
            .event_handler(DiscordHandler::new(relay.clone()))
            .await
            .map_err(|error| MessagingError::Client(error.to_string()))?;

        match client.start().await {
            Ok(()) => tracing::warn!("discord gateway closed, reconnecting"),
            Err(serenity::Error::Gateway(GatewayError::InvalidAuthentication)) => {
                return Err(MessagingError::Client("discord rejected the bot token".into()).into());
            }
            Err(error) => tracing::warn!(%error, "discord client disconnected, reconnecting"),
        }

        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Handler for Discord gateway events.
pub struct DiscordHandler {
    relay: Arc<Relay>,
}

impl DiscordHandler {
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Roles the bot holds in the message's guild. Only looked up when role
    /// mentions can trigger and the message actually mentions a role.
    async fn bot_roles(&self, ctx: &Context, msg: &Message, bot_id: u64) -> Vec<u64> {
        if !self.relay.trigger().role_mentions || msg.mention_roles.is_empty() {
            return Vec::new();
        }
        let Some(guild_id) = msg.guild_id else {
            return Vec::new();
        };

        match guild_id.member(ctx, bot_id).await {
            Ok(member) => member.roles.iter().map(|role| role.get()).collect(),
            Err(error) => {
                tracing::warn!(%error, guild_id = %guild_id, "failed to look up bot roles");
                Vec::new()
            }
        }
    }

    async fn handle_ask(&self, ctx: &Context, command: &CommandInteraction) {
        if let Err(error) = command.defer(&ctx.http).await {
            tracing::warn!(%error, "failed to defer /ask");
            return;
        }

        let mut request = AskRequest {
            interaction_id: command.id.get(),
            channel_id: command.channel_id.get(),
            user_id: command.user.id.get(),
            question: String::new(),
            image: None,
            search: None,
        };
        for option in command.data.options() {
            match (option.name, option.value) {
                ("question", ResolvedValue::String(text)) => request.question = text.to_string(),
                ("image", ResolvedValue::Attachment(attachment)) => {
                    request.image = Some(Attachment {
                        filename: attachment.filename.clone(),
                        url: attachment.url.clone(),
                        content_type: attachment.content_type.clone(),
                    });
                }
                ("search", ResolvedValue::Boolean(search)) => request.search = Some(search),
                _ => {}
            }
        }

        let responder = InteractionResponder {
            http: ctx.http.clone(),
            command,
            ephemeral: false,
        };
        self.relay.handle_ask(&request, &responder).await;
    }

    async fn handle_clear(&self, ctx: &Context, command: &CommandInteraction) {
        if let Err(error) = command.defer_ephemeral(&ctx.http).await {
            tracing::warn!(%error, "failed to defer /clear");
            return;
        }

        let key = ConversationKey::new(command.channel_id.get(), command.user.id.get());
        let text = match self.relay.clear(key).await {
            Ok(removed) => clear_message(removed).to_string(),
            Err(error) => {
                tracing::error!(conversation = %key, %error, "failed to clear history");
                prompts::error_notice(error.category())
            }
        };

        let responder = InteractionResponder {
            http: ctx.http.clone(),
            command,
            ephemeral: true,
        };
        if let Err(error) = responder.reply(&text).await {
            tracing::warn!(%error, "failed to answer /clear");
        }
    }

    async fn handle_help(&self, ctx: &Context, command: &CommandInteraction) {
        let response = CreateInteractionResponse::Message(
            CreateInteractionResponseMessage::new().embed(help_embed()),
        );
        if let Err(error) = command.create_response(&ctx.http, response).await {
            tracing::warn!(%error, "failed to answer /help");
        }
    }
}

#[async_trait]
impl EventHandler for DiscordHandler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(
            bot_name = %ready.user.name,
            bot_id = %ready.user.id,
            guilds = ready.guilds.len(),
            "discord bot ready"
        );

        ctx.set_presence(
            Some(ActivityData::listening(prompts::PRESENCE_TEXT)),
            OnlineStatus::Online,
        );

        match Command::set_global_commands(&ctx.http, registered_commands()).await {
            Ok(commands) => tracing::info!(count = commands.len(), "slash commands registered"),
            Err(error) => tracing::warn!(%error, "failed to register slash commands"),
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let bot_id = ctx.cache.current_user().id.get();
        let bot = BotIdentity {
            user_id: bot_id,
            role_ids: self.bot_roles(&ctx, &msg, bot_id).await,
        };
        let inbound = inbound_message(&msg);
        if !self.relay.trigger().should_engage(&inbound, &bot) {
            return;
        }

        let typing = msg.channel_id.start_typing(&ctx.http);
        let history = SerenityHistory {
            http: ctx.http.clone(),
        };
        let responder = MessageResponder {
            http: ctx.http.clone(),
            message: &msg,
        };

        self.relay
            .handle_message(&inbound, &bot, &history, &responder)
            .await;
        typing.stop();
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        let Interaction::Command(command) = interaction else {
            return;
        };

        tracing::debug!(command = %command.data.name, user_id = %command.user.id, "slash command received");

        match command.data.name.as_str() {
            "ask" => self.handle_ask(&ctx, &command).await,
            "clear" => self.handle_clear(&ctx, &command).await,
            "help" => self.handle_help(&ctx, &command).await,
            other => tracing::debug!(command = other, "ignoring unknown command"),
        }
    }
}

/// Map a serenity message into the platform-neutral inbound shape.
pub fn inbound_message(msg: &Message) -> InboundMessage {
    InboundMessage {
        id: msg.id.get(),
        channel_id: msg.channel_id.get(),
        author_id: msg.author.id.get(),
        author_name: display_name(msg),
        author_is_bot: msg.author.bot,
        content: msg.content.clone(),
        mentions: msg.mentions.iter().map(|user| user.id.get()).collect(),
        role_mentions: msg.mention_roles.iter().map(|role| role.get()).collect(),
        attachments: msg
            .attachments
            .iter()
            .map(|attachment| Attachment {
                filename: attachment.filename.clone(),
                url: attachment.url.clone(),
                content_type: attachment.content_type.clone(),
            })
            .collect(),
        timestamp: chrono::DateTime::from_timestamp(msg.timestamp.unix_timestamp(), 0)
            .unwrap_or_else(chrono::Utc::now),
    }
}

fn display_name(msg: &Message) -> String {
    msg.author
        .global_name
        .clone()
        .unwrap_or_else(|| msg.author.name.clone())
}

/// Slash commands registered globally on ready.
pub fn registered_commands() -> Vec<CreateCommand> {
    vec![
        CreateCommand::new("ask")
            .description("Ask the AI a question")
            .add_option(
                CreateCommandOption::new(CommandOptionType::String, "question", "Your question")
                    .required(true),
            )
            .add_option(CreateCommandOption::new(
                CommandOptionType::Attachment,
                "image",
                "Attach an image (optional)",
            ))
            .add_option(CreateCommandOption::new(
                CommandOptionType::Boolean,
                "search",
                "Force web search on or off (optional)",
            )),
        CreateCommand::new("clear").description("Clear your conversation history"),
        CreateCommand::new("help").description("Show how to use the bot"),
    ]
}

fn help_embed() -> CreateEmbed {
    HELP_FIELDS.iter().fold(
        CreateEmbed::new()
            .title("AI Bot Help")
            .description("A bot you can ask questions!")
            .colour(Colour::BLUE)
            .footer(CreateEmbedFooter::new(HELP_FOOTER)),
        |embed, (name, value)| embed.field(*name, *value, false),
    )
}

fn clear_message(removed: bool) -> &'static str {
    if removed {
        prompts::HISTORY_CLEARED
    } else {
        prompts::HISTORY_ALREADY_EMPTY
    }
}

/// Reads channel chatter over the REST API.
struct SerenityHistory {
    http: Arc<Http>,
}

#[async_trait]
impl ChannelHistory for SerenityHistory {
    async fn messages_before(
        &self,
        channel_id: u64,
        before: EventId,
        limit: usize,
    ) -> Result<Vec<HistoryMessage>> {
        // Discord caps a single page at 100.
        let limit = limit.min(100) as u8;
        let builder = GetMessages::new().before(MessageId::new(before)).limit(limit);

        let messages = ChannelId::new(channel_id)
            .messages(&self.http, builder)
            .await
            .map_err(|error| MessagingError::HistoryUnavailable(error.to_string()))?;

        // Discord returns newest first.
        Ok(messages
            .iter()
            .rev()
            .map(|message| HistoryMessage {
                id: message.id.get(),
                author: display_name(message),
                content: message.content.clone(),
            })
            .collect())
    }
}

/// Replies to a channel message; follow-ups go to the same channel.
struct MessageResponder<'a> {
    http: Arc<Http>,
    message: &'a Message,
}

#[async_trait]
impl Responder for MessageResponder<'_> {
    async fn reply(&self, text: &str) -> Result<()> {
        self.message
            .reply(&self.http, text)
            .await
            .map_err(|error| MessagingError::SendFailed(error.to_string()))?;
        Ok(())
    }

    async fn follow_up(&self, text: &str) -> Result<()> {
        self.message
            .channel_id
            .say(&self.http, text)
            .await
            .map_err(|error| MessagingError::SendFailed(error.to_string()))?;
        Ok(())
    }
}

/// Answers a deferred slash command through interaction follow-ups.
struct InteractionResponder<'a> {
    http: Arc<Http>,
    command: &'a CommandInteraction,
    ephemeral: bool,
}

#[async_trait]
impl Responder for InteractionResponder<'_> {
    async fn reply(&self, text: &str) -> Result<()> {
        self.follow_up(text).await
    }

    async fn follow_up(&self, text: &str) -> Result<()> {
        let followup = CreateInteractionResponseFollowup::new()
            .content(text)
            .ephemeral(self.ephemeral);
        self.command
            .create_followup(&self.http, followup)
            .await
            .map_err(|error| MessagingError::SendFailed(error.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_include_message_content() {
        let intents = intents();
        assert!(intents.contains(GatewayIntents::MESSAGE_CONTENT));
        assert!(intents.contains(GatewayIntents::GUILD_MESSAGES));
        assert!(intents.contains(GatewayIntents::DIRECT_MESSAGES));
    }

    #[test]
    fn ask_clear_and_help_are_registered() {
        let commands: Vec<serde_json::Value> = registered_commands()
            .iter()
            .map(|command| serde_json::to_value(command).expect("serialize command"))
            .collect();

        let names: Vec<&str> = commands
            .iter()
            .filter_map(|command| command["name"].as_str())
            .collect();
        assert_eq!(names, ["ask", "clear", "help"]);

        let options = commands[0]["options"].as_array().expect("ask options");
        let option_names: Vec<&str> = options
            .iter()
            .filter_map(|option| option["name"].as_str())
            .collect();
        assert_eq!(option_names, ["question", "image", "search"]);
        assert_eq!(options[0]["required"], true);
    }

    #[test]
    fn clear_message_reflects_whether_anything_was_removed() {
        assert_eq!(clear_message(true), prompts::HISTORY_CLEARED);
        assert_eq!(clear_message(false), prompts::HISTORY_ALREADY_EMPTY);
    }

    #[test]
    fn help_lists_every_command() {
        let embed = serde_json::to_value(help_embed()).expect("serialize embed");
        let fields = embed["fields"].as_array().expect("fields");
        assert_eq!(fields.len(), HELP_FIELDS.len());
        assert!(fields.iter().any(|field| field["name"] == "/clear"));
        assert_eq!(embed["footer"]["text"], HELP_FOOTER);
    }
}
