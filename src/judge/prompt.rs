pub const ELA_PROMPT: &str = "You are a world-leading expert in digital image forensics. An Error Level Analysis (ELA) has been run on a piece of evidence.

Two images are attached:
1. The original evidence image.
2. The ELA map generated from that evidence.

In an authentic photograph the ELA map is mostly dark, with brighter areas concentrated around high-contrast edges. In an AI-generated image the synthesized content tends to show a uniform, elevated error level, visible as a consistent bright texture across the ELA map.

Using the ELA map together with the original image, decide whether the evidence is REAL or FAKE. Respond with a JSON object containing one key, \"final_verdict\", whose value is either \"REAL\" or \"FAKE\".";

pub const COMPRESSION_AUDIT_PROMPT: &str = "You are a world-leading expert in digital image forensics. The attached image was deliberately re-compressed at 90% JPEG quality as a stress test that exposes digital inconsistencies.

Analyze the re-compression artifacts in this image.
- In a REAL photograph the artifacts are irregular and follow the natural complexity of the scene: heavier on detailed edges, lighter on smooth surfaces.
- In an AI-GENERATED image the artifacts tend to be uniform, blocky or patterned, betraying the mathematical structure of the generator.

Based on the compression artifacts in this stressed image, is the image REAL or FAKE? Respond with a JSON object containing one key, \"final_verdict\", whose value is either \"REAL\" or \"FAKE\".";
