//! Default prompt templates for AI interactions

/// Opening of the assistant's system instruction
pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are Aikadin, a fashion assistant. You help users with fashion, style, clothing and outfit questions.";

/// Closing instruction appended after the profile context
pub const PERSONALIZATION_PROMPT: &str = "Give personalized fashion advice based on this information. Tailor suggestions to the user's body type, style and preferred colors. Answer the user's questions specifically and in detail, in a warm and friendly tone.";

/// Welcome messages shown when a chat session is opened
pub const WELCOME_MESSAGES: [&str; 2] = [
    "Hi! I'm Aikadin, your AI fashion assistant. How can I help you today?",
    "I can help you with:\n• Daily outfit ideas\n• Special occasion looks\n• Color matching\n• Style advice\n• Seasonal trends",
];

/// System prompt for the image-based style analysis
pub const STYLE_ANALYST_PROMPT: &str = "You are a professional fashion consultant. Given a photo of a person and a photo of a garment, you analyse in detail how the garment would look on the person in a professional and useful way.";

/// User instruction for the image-based style analysis. `{region}` is replaced
/// with the garment category's body region.
pub const STYLE_ANALYSIS_REQUEST: &str = "Analyse these person and garment photos and prepare a detailed virtual try-on report for a garment worn on {region}. Cover: 1) color harmony with the skin tone 2) fit for the body type 3) style match 4) outfit suggestions 5) overall verdict. Write in a friendly tone.";

/// Text used when a provider returns no chat content
pub const NO_REPLY_TEXT: &str = "No response received from the assistant.";

/// Text used when a provider returns no analysis content
pub const NO_ANALYSIS_TEXT: &str = "The analysis could not be completed.";

/// Label prefixed to every simulated reply
pub const SIMULATED_LABEL: &str = "[Offline mode - simulated reply]";

/// Canned replies used when no API key is configured
pub const SIMULATED_REPLIES: [&str; 4] = [
    "That's a great style choice! I think it will suit you well, especially in terms of color harmony.",
    "I have a few suggestions for this outfit. The style fits you, and for accessories you could try...",
    "The piece you picked is trendy and elegant, and it works for your body type. To style it, I'd suggest...",
    "Excellent pick! This piece will become a wardrobe staple. With different combinations you can...",
];
