//! Localized UI strings.
//!
//! Every label re-resolves through [`tr`] on each frame, so toggling the
//! language repaints the whole UI with the other table on the next pass.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lang {
    Zh,
    En,
}

impl Lang {
    pub fn code(&self) -> &'static str {
        match self {
            Lang::Zh => "zh",
            Lang::En => "en",
        }
    }

    /// Unknown codes fall back to Chinese, the shipped default.
    pub fn from_code(code: &str) -> Self {
        match code {
            "en" => Lang::En,
            _ => Lang::Zh,
        }
    }

    pub fn toggled(&self) -> Self {
        match self {
            Lang::Zh => Lang::En,
            Lang::En => Lang::Zh,
        }
    }
}

/// Resolve `key` for `lang`. Unknown keys fall back to the key itself so
/// a missing entry shows up as an obvious literal rather than a panic.
pub fn tr<'a>(lang: Lang, key: &'a str) -> &'a str {
    let resolved = match lang {
        Lang::Zh => tr_zh(key),
        Lang::En => tr_en(key),
    };
    resolved.unwrap_or(key)
}

fn tr_zh(key: &str) -> Option<&'static str> {
    Some(match key {
        "title" => "多云聊天平台",
        "subtitle" => "支持阿里云通义千问和 OpenAI GPT",
        "placeholder" => "输入消息... (Shift + Enter 换行)",
        "send" => "发送",
        "thinking" => "思考中",
        "newChat" => "新对话",
        "counselor" => "心理医生",
        "counselorIntro" => "欢迎来到心理医生对话。我会倾听并提供情绪调节与放松练习建议，帮助你梳理问题并给出可行的下一步方法。如处于紧急危机或有自伤倾向，请立刻联系当地紧急服务或信任的人。本工具不替代专业治疗。可先用一两句话描述你当前最困扰的事。",
        "imageGen" => "生成图片",
        "settings" => "设置",
        "model" => "模型",
        "chatHistory" => "聊天历史",
        "chatHistoryEmpty" => "暂无历史记录",
        "apiKeySettings" => "API 密钥设置",
        "modelSettings" => "模型设置",
        "imageProvider" => "图片生成平台",
        "customApiKey" => "自定义 API Key",
        "apiKeyHint" => "留空使用默认配置，根据选择的云平台输入对应的 API Key",
        "freeUsage" => "免费配额",
        "quotaHint" => "超出后需输入自己的 API Key",
        "quotaExceeded" => "免费配额已用完，请在设置中输入自己的 API Key",
        "endpointUrl" => "终端 URL",
        "endpointHint" => "可选，留空使用默认终端",
        "serverUrl" => "服务器地址",
        "imageModel" => "图片模型",
        "imageSize" => "图片尺寸",
        "imagePromptPlaceholder" => "描述你想要生成的图片...",
        "generateImage" => "生成图片",
        "generating" => "生成中...",
        "language" => "语言",
        "darkMode" => "深色模式",
        "lightMode" => "浅色模式",
        "notice" => "提示",
        "delete" => "删除",
        _ => return None,
    })
}

fn tr_en(key: &str) -> Option<&'static str> {
    Some(match key {
        "title" => "Multi-Cloud Chat Platform",
        "subtitle" => "Powered by Alibaba Qwen and OpenAI GPT",
        "placeholder" => "Type a message... (Shift + Enter for new line)",
        "send" => "Send",
        "thinking" => "Thinking",
        "newChat" => "New Chat",
        "counselor" => "Counselor",
        "counselorIntro" => "Welcome to the counselor chat. I will listen, suggest ways to settle difficult feelings, and help you sort out a workable next step. If you are in crisis or thinking about harming yourself, contact local emergency services or someone you trust right away. This tool is not a substitute for professional care. Start by describing, in a sentence or two, what is troubling you most.",
        "imageGen" => "Generate Image",
        "settings" => "Settings",
        "model" => "Model",
        "chatHistory" => "Chat History",
        "chatHistoryEmpty" => "No chat history",
        "apiKeySettings" => "API Key Settings",
        "modelSettings" => "Model Settings",
        "imageProvider" => "Image Generation Provider",
        "customApiKey" => "Custom API Key",
        "apiKeyHint" => "Leave empty to use default, enter the API Key for your selected provider",
        "freeUsage" => "Free Quota",
        "quotaHint" => "Enter your own API Key after exceeding",
        "quotaExceeded" => "Free quota exhausted, please enter your own API Key in settings",
        "endpointUrl" => "Endpoint URL",
        "endpointHint" => "Optional, leave blank to use default endpoint",
        "serverUrl" => "Server URL",
        "imageModel" => "Image Model",
        "imageSize" => "Image Size",
        "imagePromptPlaceholder" => "Describe the image you want to generate...",
        "generateImage" => "Generate",
        "generating" => "Generating...",
        "language" => "Language",
        "darkMode" => "Dark Mode",
        "lightMode" => "Light Mode",
        "notice" => "Notice",
        "delete" => "Delete",
        _ => return None,
    })
}
