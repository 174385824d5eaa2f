//! Static vocabulary for the product matcher.
//!
//! Keys are in post-normalization form: NFKC, lowercase, katakana folded
//! to hiragana. Kanji entries stay as written since NFKC leaves them
//! untouched.

use std::collections::{HashMap, HashSet};

use lazy_static::lazy_static;

lazy_static! {
    /// Brand aliases: normalized variant -> canonical lowercase English form.
    pub static ref BRAND_ALIASES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Gaming
        m.insert("にんてんどー", "nintendo");
        m.insert("にんてんどう", "nintendo");
        m.insert("任天堂", "nintendo");
        m.insert("nintendo", "nintendo");
        m.insert("そにー", "sony");
        m.insert("sony", "sony");
        m.insert("ぷれいすてーしょん", "playstation");
        m.insert("ぷれすて", "playstation");
        m.insert("playstation", "playstation");
        m.insert("ps", "playstation");
        m.insert("xbox", "xbox");
        m.insert("まいくろそふと", "microsoft");
        m.insert("microsoft", "microsoft");
        m.insert("せが", "sega");
        m.insert("sega", "sega");
        m.insert("ばんだい", "bandai");
        m.insert("bandai", "bandai");
        m.insert("こなみ", "konami");
        m.insert("konami", "konami");
        m.insert("かぷこん", "capcom");
        m.insert("capcom", "capcom");
        m.insert("すくえに", "square enix");
        m.insert("square", "square enix");
        m.insert("なむこ", "namco");
        m.insert("namco", "namco");
        m.insert("たから", "takara");
        m.insert("takara", "takara");
        m.insert("とみー", "tomy");
        m.insert("tomy", "tomy");
        // Electronics
        m.insert("あっぷる", "apple");
        m.insert("apple", "apple");
        m.insert("さむすん", "samsung");
        m.insert("samsung", "samsung");
        m.insert("ぱなそにっく", "panasonic");
        m.insert("panasonic", "panasonic");
        m.insert("しゃーぷ", "sharp");
        m.insert("sharp", "sharp");
        m.insert("とうしば", "toshiba");
        m.insert("東芝", "toshiba");
        m.insert("toshiba", "toshiba");
        m.insert("ひたち", "hitachi");
        m.insert("日立", "hitachi");
        m.insert("hitachi", "hitachi");
        m.insert("きやのん", "canon");
        m.insert("きゃのん", "canon");
        m.insert("canon", "canon");
        m.insert("にこん", "nikon");
        m.insert("nikon", "nikon");
        m.insert("おりんぱす", "olympus");
        m.insert("olympus", "olympus");
        m.insert("ふじふいるむ", "fujifilm");
        m.insert("fujifilm", "fujifilm");
        m.insert("fuji", "fujifilm");
        m.insert("かしお", "casio");
        m.insert("casio", "casio");
        m.insert("えぷそん", "epson");
        m.insert("epson", "epson");
        m.insert("ぼーず", "bose");
        m.insert("bose", "bose");
        m.insert("jbl", "jbl");
        m.insert("ぜんはいざー", "sennheiser");
        m.insert("sennheiser", "sennheiser");
        m.insert("おーでぃおてくにか", "audio-technica");
        m.insert("audio-technica", "audio-technica");
        // Home / lifestyle
        m.insert("だいそん", "dyson");
        m.insert("dyson", "dyson");
        m.insert("あいろぼっと", "irobot");
        m.insert("irobot", "irobot");
        m.insert("るんば", "roomba");
        m.insert("roomba", "roomba");
        m.insert("ぶらうん", "braun");
        m.insert("braun", "braun");
        m.insert("ふぃりっぷす", "philips");
        m.insert("philips", "philips");
        m.insert("だいきん", "daikin");
        m.insert("daikin", "daikin");
        m.insert("あいりすおーやま", "iris ohyama");
        m.insert("iris", "iris ohyama");
        m.insert("irisohyama", "iris ohyama");
        m.insert("ついんばーど", "twinbird");
        m.insert("twinbird", "twinbird");
        m.insert("まきた", "makita");
        m.insert("makita", "makita");
        m.insert("ぞうじるし", "zojirushi");
        m.insert("象印", "zojirushi");
        m.insert("zojirushi", "zojirushi");
        m.insert("たいがー", "tiger");
        m.insert("tiger", "tiger");
        m.insert("てぃふぁーる", "tefal");
        m.insert("tefal", "tefal");
        m.insert("t-fal", "tefal");
        m.insert("でろんぎ", "delonghi");
        m.insert("delonghi", "delonghi");
        m.insert("みつびし", "mitsubishi");
        m.insert("三菱", "mitsubishi");
        m.insert("mitsubishi", "mitsubishi");
        m.insert("えれくとろらっくす", "electrolux");
        m.insert("electrolux", "electrolux");
        m.insert("ばるみゅーだ", "balmuda");
        m.insert("balmuda", "balmuda");
        m.insert("あんかー", "anker");
        m.insert("anker", "anker");
        m.insert("ばっふぁろー", "buffalo");
        m.insert("buffalo", "buffalo");
        m.insert("えれこむ", "elecom");
        m.insert("elecom", "elecom");
        m.insert("ろじくーる", "logicool");
        m.insert("logicool", "logicool");
        m.insert("logitech", "logicool");
        m.insert("しゅあー", "shure");
        m.insert("shure", "shure");
        m.insert("ごーぷろ", "gopro");
        m.insert("gopro", "gopro");
        // Toys / collectibles
        m.insert("ぽけもん", "pokemon");
        m.insert("pokemon", "pokemon");
        m.insert("れご", "lego");
        m.insert("lego", "lego");
        m.insert("めでぃこむ", "medicom");
        m.insert("medicom", "medicom");
        m.insert("ふぃぐま", "figma");
        m.insert("figma", "figma");
        m.insert("ぐっどすまいる", "goodsmile");
        m.insert("goodsmile", "goodsmile");
        m.insert("ことぶきや", "kotobukiya");
        m.insert("kotobukiya", "kotobukiya");
        m.insert("べありっく", "bearbrick");
        m.insert("bearbrick", "bearbrick");
        m
    };

    /// Canonical brand values, for brand extraction after canonicalization.
    pub static ref BRAND_VALUES: HashSet<&'static str> =
        BRAND_ALIASES.values().copied().collect();

    /// Product synonyms: normalized kana/English variant -> canonical form.
    pub static ref PRODUCT_SYNONYMS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        // Game consoles
        m.insert("すいっち", "switch");
        m.insert("switch", "switch");
        m.insert("ふぁみこん", "famicom");
        m.insert("famicom", "famicom");
        m.insert("すーふぁみ", "super famicom");
        m.insert("げーむぼーい", "gameboy");
        m.insert("gameboy", "gameboy");
        // Audio
        m.insert("へっどほん", "headphone");
        m.insert("headphone", "headphone");
        m.insert("headphones", "headphone");
        m.insert("いやほん", "earphone");
        m.insert("earphone", "earphone");
        m.insert("earphones", "earphone");
        m.insert("いやーぴーす", "earpiece");
        m.insert("すぴーかー", "speaker");
        m.insert("speaker", "speaker");
        m.insert("speakers", "speaker");
        // Accessories
        m.insert("こんとろーらー", "controller");
        m.insert("controller", "controller");
        m.insert("りもこん", "remote");
        m.insert("けーす", "case");
        m.insert("case", "case");
        m.insert("かばー", "cover");
        m.insert("cover", "cover");
        m.insert("ちゃーじゃー", "charger");
        m.insert("charger", "charger");
        m.insert("あだぷたー", "adapter");
        m.insert("adapter", "adapter");
        m.insert("けーぶる", "cable");
        m.insert("cable", "cable");
        // Devices
        m.insert("すまほ", "smartphone");
        m.insert("すまーとふぉん", "smartphone");
        m.insert("smartphone", "smartphone");
        m.insert("たぶれっと", "tablet");
        m.insert("tablet", "tablet");
        m.insert("のーとぱそこん", "laptop");
        m.insert("laptop", "laptop");
        m.insert("でぃすぷれい", "display");
        m.insert("display", "display");
        m.insert("もにたー", "monitor");
        m.insert("monitor", "monitor");
        m.insert("きーぼーど", "keyboard");
        m.insert("keyboard", "keyboard");
        m.insert("まうす", "mouse");
        m.insert("mouse", "mouse");
        m.insert("ぷりんたー", "printer");
        m.insert("printer", "printer");
        m.insert("かめら", "camera");
        m.insert("camera", "camera");
        m.insert("れんず", "lens");
        m.insert("lens", "lens");
        // Action-camera series name
        m.insert("ひーろー", "hero");
        m.insert("hero", "hero");
        // Edition qualifiers useful for distinguishing products
        m.insert("でじたる", "digital");
        m.insert("digital", "digital");
        m.insert("わいやれす", "wireless");
        m.insert("wireless", "wireless");
        m.insert("ぶるーとぅーす", "bluetooth");
        m.insert("bluetooth", "bluetooth");
        m
    };

    /// Listing noise excluded from similarity comparison.
    pub static ref NOISE_WORDS: HashSet<&'static str> = [
        // Japanese listing noise
        "送料", "無料", "中古", "美品", "新品", "未使用", "未開封", "即決",
        "まとめ", "じゃんく", "動作", "確認", "済み", "付き",
        "箱", "あり", "なし", "のみ", "非売品", "正規品",
        "国内", "海外", "保証", "付属", "欠品",
        // Japanese particles
        "の", "が", "で", "に", "は", "を", "と", "も", "や",
        "から", "まで", "より", "など", "ほど",
        // English noise
        "a", "the", "and", "or", "for", "with", "in", "on", "at", "to", "of",
        "is", "it", "no", "not", "be", "an", "as", "by",
        "new", "used", "free", "shipping", "japan", "import",
    ]
    .into_iter()
    .collect();

    /// Apparel / fashion brands — listings under these never enter matching.
    pub static ref APPAREL_BRANDS: HashSet<&'static str> = [
        "nike", "ないき", "ナイキ",
        "adidas", "あでぃだす", "アディダス",
        "supreme", "しゅぷりーむ", "シュプリーム",
        "gucci", "ぐっち", "グッチ",
        "louis vuitton", "ルイヴィトン", "るいう゛ぃとん", "ヴィトン", "う゛ぃとん",
        "hermes", "えるめす", "エルメス",
        "chanel", "しゃねる", "シャネル",
        "prada", "ぷらだ", "プラダ",
        "dior", "でぃおーる", "ディオール",
        "balenciaga", "ばれんしあが", "バレンシアガ",
        "fendi", "ふぇんでぃ", "フェンディ",
        "burberry", "ばーばりー", "バーバリー",
        "coach", "こーち", "コーチ",
        "celine", "せりーぬ", "セリーヌ",
        "bottega veneta", "ぼってがう゛ぇねた", "ボッテガ",
        "yves saint laurent", "いう゛さんろーらん", "サンローラン",
        "loewe", "ろえべ", "ロエベ",
        "valentino", "う゛ぁれんてぃの", "ヴァレンティノ",
        "versace", "う゛ぇるさーち", "ヴェルサーチ",
        "givenchy", "じばんしー", "ジバンシー",
        "puma", "ぷーま", "プーマ",
        "reebok", "りーぼっく", "リーボック",
        "new balance", "にゅーばらんす", "ニューバランス",
        "under armour", "あんだーあーまー", "アンダーアーマー",
        "the north face", "のーすふぇいす", "ノースフェイス",
        "patagonia", "ぱたごにあ", "パタゴニア",
        "converse", "こんばーす", "コンバース",
        "vans", "ばんず", "バンズ",
        "asics", "あしっくす", "アシックス",
        "uniqlo", "ゆにくろ", "ユニクロ",
        "comme des garcons", "こむでぎゃるそん", "コムデギャルソン",
        "bape", "べいぷ", "ベイプ",
        "stussy", "すてゅーしー", "ステューシー",
    ]
    .into_iter()
    .collect();

    /// Apparel product-type words.
    pub static ref APPAREL_WORDS: HashSet<&'static str> = [
        // Clothing
        "服", "衣類", "洋服", "ふく",
        "じゃけっと", "ジャケット", "jacket",
        "こーと", "コート", "coat",
        "ぱーかー", "パーカー", "hoodie", "parka",
        "てぃーしゃつ", "tシャツ", "tしゃつ", "t-shirt", "tshirt", "tee",
        "しゃつ", "シャツ", "shirt",
        "ぱんつ", "パンツ", "pants", "trousers",
        "じーんず", "ジーンズ", "jeans", "denim", "でにむ",
        "すかーと", "スカート", "skirt",
        "わんぴーす", "ワンピース",
        "すーつ", "スーツ", "suit",
        "べすと", "ベスト", "vest",
        "にっと", "ニット", "knit", "sweater", "せーたー",
        "すうぇっと", "スウェット", "sweatshirt",
        "ぶらうす", "ブラウス", "blouse",
        "だうん", "ダウン", "down",
        // Shoes
        "靴", "くつ", "シューズ", "しゅーず", "shoes", "shoe",
        "すにーかー", "スニーカー", "sneaker", "sneakers",
        "ぶーつ", "ブーツ", "boots",
        "さんだる", "サンダル", "sandal", "sandals",
        "ろーふぁー", "ローファー", "loafer",
        "ぱんぷす", "パンプス", "pumps",
        // Bags
        "ばっぐ", "バッグ", "bag", "bags",
        "はんどばっぐ", "ハンドバッグ", "handbag",
        "しょるだーばっぐ", "ショルダーバッグ",
        "とーとばっぐ", "トートバッグ", "tote",
        "りゅっく", "リュック", "backpack",
        "ぼすとん", "ボストン",
        "くらっち", "クラッチ", "clutch",
        // Wallets / small leather goods
        "財布", "さいふ", "wallet",
        "長財布", "ながさいふ",
        "折り財布", "おりさいふ",
        "がまぐち", "がま口",
        "きーけーす", "キーケース",
        "かーどけーす", "カードケース",
        "めいしいれ", "名刺入れ",
        "こいんけーす", "コインケース",
        // Belts / scarves / ties
        "べると", "ベルト", "belt",
        "すかーふ", "スカーフ", "scarf",
        "ねくたい", "ネクタイ", "necktie", "tie",
        "まふらー", "マフラー", "muffler",
        "すとーる", "ストール", "stole",
        // Hats
        "帽子", "ぼうし", "hat", "cap",
        "きゃっぷ", "びーにー", "ビーニー", "beanie",
        // Jewelry / accessories
        "あくせさりー", "アクセサリー", "accessory",
        "ねっくれす", "ネックレス", "necklace",
        "ぶれすれっと", "ブレスレット", "bracelet",
        "りんぐ", "リング", "ring",
        "ぴあす", "ピアス", "piercing", "earring",
        "いやりんぐ", "イヤリング",
        "さんぐらす", "サングラス", "sunglasses",
        // Apparel general
        "apparel", "あぱれる", "アパレル",
        "fashion", "ふぁっしょん", "ファッション",
        "wear", "うぇあ", "ウェア",
        "clothing", "くろーじんぐ",
    ]
    .into_iter()
    .collect();

    /// Product-type groups. Tokens in one group are interchangeable;
    /// tokens across groups conflict (パック ≠ BOX ≠ 本体 ≠ ケース).
    pub static ref PRODUCT_TYPE_GROUPS: Vec<HashSet<&'static str>> = vec![
        ["本体", "ほんたい"].into_iter().collect(),
        ["けーす", "case", "かばー", "cover"].into_iter().collect(),
        ["ぱっく", "pack"].into_iter().collect(),
        ["box", "ぼっくす"].into_iter().collect(),
        ["せっと", "set"].into_iter().collect(),
        ["ばんどる", "bundle"].into_iter().collect(),
        ["りふぃる", "refill", "かえ", "替え"].into_iter().collect(),
        ["こんとろーらー", "controller"].into_iter().collect(),
        ["充電", "じゅうでん", "charger"].into_iter().collect(),
        ["拡張", "かくちょう", "expansion"].into_iter().collect(),
        ["ぷろも", "promo", "promotional"].into_iter().collect(),
        ["すたーたー", "starter"].into_iter().collect(),
        ["ぶーすたー", "booster"].into_iter().collect(),
    ];

    /// Token -> product-type group index.
    pub static ref TYPE_TOKEN_TO_GROUP: HashMap<&'static str, usize> = {
        let mut m = HashMap::new();
        for (gi, group) in PRODUCT_TYPE_GROUPS.iter().enumerate() {
            for tok in group {
                m.insert(*tok, gi);
            }
        }
        m
    };

    /// Sub-model variant words that turn a base model into a distinct SKU
    /// ("V8 Fluffy" vs "V8 Slim Fluffy Extra").
    pub static ref SUBMODEL_WORDS: HashSet<&'static str> = [
        "slim", "すりむ",
        "extra", "えくすとら",
        "plus", "ぷらす",
        "pro", "ぷろ",
        "lite", "らいと",
        "mini", "みに",
        "max", "まっくす",
        "ultra", "うるとら",
        "neo", "ねお",
        "advance", "あどばんす",
        "premium", "ぷれみあむ",
        "deluxe", "でらっくす",
        "compact", "こんぱくと",
        "standard", "すたんだーど",
        // Cordless vacuum variants
        "fluffy", "ふらっふぃ",
        "absolute", "あぶそりゅーと",
        "animal", "あにまる",
        "motorhead", "もーたーへっど",
        "origin", "おりじん",
        "complete", "こんぷりーと",
        "totalclean",
        // Hair products
        "supersonic", "すーぱーそにっく",
        "airwrap", "えあらっぷ",
        "corrale", "こらーる",
        // Action-camera editions
        "creator", "くりえいたー",
        "session", "せっしょん",
    ]
    .into_iter()
    .collect();

    /// Katakana submodel word -> canonical English form.
    pub static ref SUBMODEL_CANONICAL: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("すりむ", "slim");
        m.insert("えくすとら", "extra");
        m.insert("ぷらす", "plus");
        m.insert("ぷろ", "pro");
        m.insert("らいと", "lite");
        m.insert("みに", "mini");
        m.insert("まっくす", "max");
        m.insert("うるとら", "ultra");
        m.insert("ねお", "neo");
        m.insert("あどばんす", "advance");
        m.insert("ぷれみあむ", "premium");
        m.insert("でらっくす", "deluxe");
        m.insert("こんぱくと", "compact");
        m.insert("すたんだーど", "standard");
        m.insert("ふらっふぃ", "fluffy");
        m.insert("あぶそりゅーと", "absolute");
        m.insert("あにまる", "animal");
        m.insert("もーたーへっど", "motorhead");
        m.insert("おりじん", "origin");
        m.insert("こんぷりーと", "complete");
        m.insert("すーぱーそにっく", "supersonic");
        m.insert("えあらっぷ", "airwrap");
        m.insert("こらーる", "corrale");
        m.insert("くりえいたー", "creator");
        m.insert("せっしょん", "session");
        m
    };

    /// Words indicating a part / consumable / accessory.
    pub static ref ACCESSORY_WORDS: HashSet<&'static str> = [
        // Pads / cushions
        "ぱっど", "pad", "いやーぱっど", "くっしょん", "cushion",
        // Adapters / mounts
        "あだぷたー", "adapter", "まうんと", "mount", "こんばーたー", "converter",
        // Cables / connectors
        "けーぶる", "cable", "cord", "こーど", "こねくたー", "connector",
        // Covers / protectors
        "ふぃるむ", "film", "ぷろてくたー", "protector", "がーど", "guard",
        // Batteries / power / chargers
        "ばってりー", "battery", "でんち", "電池",
        "充電器", "じゅうでんき", "充電", "じゅうでん",
        "acあだぷたー", "電源", "でんげん",
        // Replacement / spare
        "交換", "こうかん", "替え", "かえ", "すぺあ", "spare",
        "部品", "ぶひん", "ぱーつ", "parts", "part",
        // Straps / holders
        "すとらっぷ", "strap", "ほるだー", "holder", "くりっぷ", "clip",
        // Caps / tips
        "きゃっぷ", "cap", "ちっぷ", "tip", "のずる", "nozzle",
        // Filters
        "ふぃるたー", "filter",
        // Stands / docks
        "すたんど", "stand", "どっく", "dock", "くれーどる", "cradle",
        // Bags / pouches
        "ぽーち", "pouch",
        // Ink / toner
        "いんく", "ink", "となー", "toner", "りぼん", "ribbon",
        // Brush / roller (vacuums)
        "ぶらし", "brush", "ろーらー", "roller", "へっど", "head",
        // Remote
        "りもこん", "remote",
        // Housing (action cameras)
        "はうじんぐ", "housing", "防水ケース", "ぼうすいけーす",
        // Mods / modules
        "mod", "もっど", "もじゅーる", "module",
        // Selfie stick / tripod
        "自撮り棒", "じどりぼう", "せるふぃーすてぃっく",
        "三脚", "さんきゃく", "tripod",
        // Only / sole (signals a partial item)
        "のみ", "only", "単品", "たんぴん", "単体", "たんたい",
    ]
    .into_iter()
    .collect();

    /// Suffixes confirming a prefix-matched token is an accessory
    /// ("へっど軽量版" -> "へっど" + remainder ending in 版).
    pub static ref ACCESSORY_PREFIX_SUFFIXES: HashSet<&'static str> = [
        "版", "用", "部", "型", "式", "台", "器",
        "のみ", "単体", "単品", "交換", "替え",
        "ぱーつ", "きっと", "kit",
    ]
    .into_iter()
    .collect();
}

/// Product-line names that merge with an adjacent number token
/// ("hero" + "12" -> "hero12").
pub const MERGE_PREFIX_WORDS: &[&str] = &["hero"];

/// Model-prefix pairs that name a single product (series name + model
/// code), e.g. Dyson "v8" + "sv10k".
pub const PAIRED_PREFIXES: &[&[&str]] = &[
    &["v", "sv"],
    &["cf", "cfi"],
    &["eh", "er"],
    &["hero", "chdhx"],
];
